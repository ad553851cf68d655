//! Read-only default documents shipped with the application.

use std::borrow::Cow;
use std::path::PathBuf;

use super::StorageError;

/// Bundled content document name
pub const CONTENT_DOCUMENT: &str = "conference.json";

/// Bundled flags document name
pub const FLAGS_DOCUMENT: &str = "featureflags.json";

static EMBEDDED_CONTENT: &str = include_str!("../../data/conference.json");
static EMBEDDED_FLAGS: &str = include_str!("../../data/featureflags.json");

/// Where first-run defaults come from.
#[derive(Debug, Clone, Default)]
pub enum Bootstrap {
    /// Documents compiled into the binary.
    #[default]
    Embedded,
    /// `conference.json` / `featureflags.json` in a directory.
    Directory(PathBuf),
    /// Documents supplied in memory.
    Documents {
        content: Option<String>,
        flags: Option<String>,
    },
    /// No bootstrap at all.
    None,
}

impl Bootstrap {
    /// Raw text of the named bundled document, if this source has it.
    pub fn document(&self, name: &str) -> Result<Option<Cow<'_, str>>, StorageError> {
        match self {
            Bootstrap::Embedded => Ok(match name {
                CONTENT_DOCUMENT => Some(Cow::Borrowed(EMBEDDED_CONTENT)),
                FLAGS_DOCUMENT => Some(Cow::Borrowed(EMBEDDED_FLAGS)),
                _ => None,
            }),
            Bootstrap::Directory(dir) => {
                let path = dir.join(name);
                match std::fs::read_to_string(&path) {
                    Ok(text) => Ok(Some(Cow::Owned(text))),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(StorageError::io(path, e)),
                }
            }
            Bootstrap::Documents { content, flags } => Ok(match name {
                CONTENT_DOCUMENT => content.as_deref().map(Cow::Borrowed),
                FLAGS_DOCUMENT => flags.as_deref().map(Cow::Borrowed),
                _ => None,
            }),
            Bootstrap::None => Ok(None),
        }
    }
}
