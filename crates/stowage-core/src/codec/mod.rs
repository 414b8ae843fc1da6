//! Document codecs
//!
//! `value` handles single scalars, `bundle` the single-item layout and
//! `state` the split node/property layout.

pub mod bundle;
pub mod state;
pub mod value;

pub use bundle::{decode_bundle, encode_bundle, BundleDocument, ChildDocument, PropertyDocument};
pub use state::{
    decode_node, decode_property, encode_node, encode_property, NodeStateDocument,
    PropertyStateDocument,
};
pub use value::{decode as decode_value, encode as encode_value, EMPTY_SENTINEL};
