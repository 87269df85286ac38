//! Names of the programs stored on the relay.
//!
//! The relay owns the programs; this is only the client's view of the list,
//! kept sorted, plus the text of the last program loaded for editing.

use exfoliator_common::InboundMessage;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LoadedProgram {
    pub name: String,
    pub content: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramCatalog {
    names: Vec<String>,
    loaded: Option<LoadedProgram>,
}

impl ProgramCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a program event. Returns `true` when the name list changed.
    pub fn apply(&mut self, msg: &InboundMessage) -> bool {
        match msg {
            InboundMessage::MacroList { macros } => {
                let mut names = macros.clone();
                names.sort();
                names.dedup();
                let changed = names != self.names;
                self.names = names;
                changed
            }
            InboundMessage::MacroCreated { name } => match self.names.binary_search(name) {
                Ok(_) => false,
                Err(at) => {
                    self.names.insert(at, name.clone());
                    true
                }
            },
            InboundMessage::MacroDeleted { name } => {
                if self.loaded.as_ref().is_some_and(|p| &p.name == name) {
                    self.loaded = None;
                }
                match self.names.binary_search(name) {
                    Ok(at) => {
                        self.names.remove(at);
                        true
                    }
                    Err(_) => false,
                }
            }
            InboundMessage::MacroContent { name, content } => {
                self.loaded = Some(LoadedProgram {
                    name: name.clone(),
                    content: content.clone(),
                });
                false
            }
            _ => false,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn loaded(&self) -> Option<&LoadedProgram> {
        self.loaded.as_ref()
    }
}
