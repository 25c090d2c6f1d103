//! Column classification and mapping confirmation.
//!
//! [`classify`] proposes a mapping from header names; [`MappingForm`] lets the
//! user adjust it and freezes the result with [`MappingForm::confirm`].

mod classifier;
mod confirmation;

pub use classifier::{HeaderField, HeaderPattern, classify, classify_block_list};
pub use confirmation::{BlockListMappingForm, ConfirmedMapping, MappingField, MappingForm};
