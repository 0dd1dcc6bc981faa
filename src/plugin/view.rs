//! Flat projection of a plugin for listings and tree views.

use serde::Serialize;

use super::Plugin;
use crate::group::{Group, GroupChild};
use crate::record::Record;

/// One line of a plugin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRow {
    pub depth: usize,
    pub tag: String,
    /// `None` for groups.
    pub form_id: Option<u32>,
    /// `dataSize` of a record, `groupSize` of a group, as read.
    pub size: u32,
    pub child_count: usize,
    pub label: String,
}

impl DisplayRow {
    fn record(record: &Record, depth: usize) -> Self {
        Self {
            depth,
            tag: record.tag().to_string(),
            form_id: Some(record.id()),
            size: record.header().data_size,
            child_count: 0,
            label: record.editor_id().unwrap_or_default().to_string(),
        }
    }

    fn group(group: &Group, depth: usize) -> Self {
        let header = group.header();
        Self {
            depth,
            tag: header.tag.to_string(),
            form_id: None,
            size: header.group_size,
            child_count: group.children().len(),
            label: format!("{} {}", header.kind.name(), header.label_text()),
        }
    }
}

impl Plugin {
    /// The header record followed by every group and record, depth first.
    pub fn display_rows(&self) -> Vec<DisplayRow> {
        let mut rows = vec![DisplayRow::record(self.header(), 0)];
        for group in self.groups() {
            push_group(&mut rows, group, 0);
        }
        rows
    }
}

fn push_group(rows: &mut Vec<DisplayRow>, group: &Group, depth: usize) {
    rows.push(DisplayRow::group(group, depth));
    for child in group.children() {
        match child {
            GroupChild::Record(entry) => {
                let mut row = DisplayRow::record(&entry.record, depth + 1);
                if let Some(sub) = &entry.group {
                    row.child_count = 1;
                    rows.push(row);
                    push_group(rows, sub, depth + 2);
                } else {
                    rows.push(row);
                }
            }
            GroupChild::Group(sub) => push_group(rows, sub, depth + 1),
        }
    }
}
