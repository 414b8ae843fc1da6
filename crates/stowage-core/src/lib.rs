//! Stowage core
//!
//! The content-repository item model (ids, names, paths, typed values, node
//! and property states, change logs) and the codecs that turn item states
//! into documents a schemaless key-value store can hold.
//!
//! ## Usage
//!
//! ```rust
//! use stowage_core::{codec, EntityId, Name, NodePropBundle, NodeState};
//!
//! let node = NodeState::new(EntityId::random()).with_type(Name::parse("folder").unwrap());
//! let bundle = NodePropBundle::from_node_state(&node);
//! let json = codec::encode_bundle(&bundle).unwrap();
//! let back = codec::decode_bundle(bundle.id, &json).unwrap();
//! assert_eq!(back.node_type, bundle.node_type);
//! ```

pub mod change_log;
pub mod codec;
pub mod error;
pub mod ids;
pub mod name;
pub mod path;
pub mod state;
pub mod uri;
pub mod value;

pub use change_log::ChangeLog;
pub use error::{CodecError, CodecResult};
pub use ids::{EntityId, PropertyId};
pub use name::Name;
pub use path::{Path, PathElement};
pub use state::{
    ChildNodeEntry, ItemState, ItemStatus, NodePropBundle, NodeReferences, NodeState,
    PropertyEntry, PropertyState,
};
pub use uri::Uri;
pub use value::{PropertyType, Value};
