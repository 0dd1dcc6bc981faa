//! Tag → record kind table.

use std::sync::LazyLock;

use ahash::AHashMap;
use tracing::debug;

use super::{ColorForm, Form, GameSettingForm, HeaderForm, ObjectForm, OpaqueForm};
use crate::codec::Tag;

type Constructor = fn() -> Form;

fn header() -> Form {
    Form::Header(HeaderForm::default())
}

fn game_setting() -> Form {
    Form::GameSetting(GameSettingForm::default())
}

fn color() -> Form {
    Form::Color(ColorForm::default())
}

fn object() -> Form {
    Form::Object(ObjectForm::default())
}

/// Game-object record types decoded with the generic object codec.
const OBJECT_TAGS: &[&[u8; 4]] = &[
    b"AACT", b"ACHR", b"ACTI", b"ADDN", b"ALCH", b"AMMO", b"ANIO", b"APPA", b"ARMA", b"ARMO",
    b"ARTO", b"ASPC", b"ASTP", b"AVIF", b"BOOK", b"BPTD", b"CAMS", b"CELL", b"CLAS", b"CLMT",
    b"COBJ", b"COLL", b"CONT", b"CPTH", b"CSTY", b"DEBR", b"DIAL", b"DLBR", b"DLVW", b"DOBJ",
    b"DOOR", b"DUAL", b"ECZN", b"EFSH", b"ENCH", b"EQUP", b"EXPL", b"EYES", b"FACT", b"FLOR",
    b"FLST", b"FSTP", b"FSTS", b"FURN", b"GLOB", b"GRAS", b"HAZD", b"HDPT", b"IDLE", b"IDLM",
    b"IMAD", b"IMGS", b"INFO", b"INGR", b"IPCT", b"IPDS", b"KEYM", b"KYWD", b"LAND", b"LCRT",
    b"LCTN", b"LGTM", b"LIGH", b"LSCR", b"LTEX", b"LVLI", b"LVLN", b"LVSP", b"MATO", b"MATT",
    b"MESG", b"MGEF", b"MISC", b"MOVT", b"MSTT", b"MUSC", b"MUST", b"NAVI", b"NAVM", b"NPC_",
    b"OTFT", b"PACK", b"PARW", b"PBAR", b"PBEA", b"PCON", b"PFLA", b"PGRE", b"PHZD", b"PMIS",
    b"PROJ", b"QUST", b"RACE", b"REFR", b"REGN", b"RELA", b"REVB", b"RFCT", b"SCEN", b"SCRL",
    b"SHOU", b"SLGM", b"SMBN", b"SMEN", b"SMQN", b"SNCT", b"SNDR", b"SOPM", b"SOUN", b"SPEL",
    b"SPGD", b"STAT", b"TACT", b"TREE", b"TXST", b"VTYP", b"WATR", b"WEAP", b"WOOP", b"WRLD",
    b"WTHR",
];

static FORM_TABLE: LazyLock<AHashMap<Tag, Constructor>> = LazyLock::new(|| {
    let mut table: AHashMap<Tag, Constructor> = AHashMap::with_capacity(OBJECT_TAGS.len() + 3);
    for tag in OBJECT_TAGS {
        table.insert(Tag::new(tag), object);
    }
    table.insert(Tag::TES4, header);
    table.insert(Tag::new(b"GMST"), game_setting);
    table.insert(Tag::new(b"CLFM"), color);
    table
});

/// Empty form for a record tag. Unregistered tags get an opaque form that
/// keeps every subrecord as read.
pub fn create(tag: Tag) -> Form {
    match FORM_TABLE.get(&tag) {
        Some(constructor) => constructor(),
        None => {
            debug!(%tag, "unsupported record type, keeping raw subrecords");
            Form::Opaque(OpaqueForm::default())
        }
    }
}

pub fn is_registered(tag: Tag) -> bool {
    FORM_TABLE.contains_key(&tag)
}
