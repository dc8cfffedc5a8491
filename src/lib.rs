//! # Easel - Broadcast Graphic Composition Engine
//!
//! Easel is the model and editing core behind a canvas editor for
//! broadcast/stream overlays. It provides:
//!
//! - **Normalization**: untrusted JSON becomes a fully-defaulted document
//! - **Snapping**: grid and edge/center alignment with guide lines
//! - **Series**: one template element expanded per ranked participant
//! - **History**: bounded undo/redo with debounced drags
//! - **Locking**: single-writer access per document with expiring leases
//!
//! ## Quick Start
//!
//! ```
//! use easel::{
//!     config::EngineConfig,
//!     document::{CanvasDocument, ElementType},
//!     series::Record,
//!     store::CanvasStore,
//! };
//! use serde_json::json;
//!
//! let doc = CanvasDocument::from_json(r#"{"elements": [], "settings": {"width": 1280}}"#)?;
//! let mut store = CanvasStore::new(doc, &EngineConfig::default());
//!
//! // A bound element comes with the series that generates its copies
//! let added = store.add_element(ElementType::PlayerName);
//! let id = added.touched[0].clone();
//! store.update_element(&id, &json!({"x": 103, "y": 198}))?;
//!
//! store.apply_preview_records(&[
//!     Record::new("p1", "Ana", 42.0, 1),
//!     Record::new("p2", "Bo", 37.0, 2),
//! ]);
//! assert_eq!(store.document().elements.len(), 2);
//!
//! assert!(store.undo());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`document`] | Document model, normalizer and pure edit operations |
//! | [`snap`] | Snap engine |
//! | [`series`] | Series generator and ranked records |
//! | [`history`] | Undo/redo snapshots |
//! | [`store`] | Document store (document + history) |
//! | [`lock`] | Collaborative lock manager |
//! | [`collab`] | Persistence and preview data collaborators |
//! | [`session`] | Locked, cancellable editing session |
//! | [`config`] | Engine configuration |
//! | [`error`] | Error types |

pub mod clock;
pub mod collab;
pub mod config;
pub mod document;
pub mod error;
pub mod history;
pub mod lock;
pub mod series;
pub mod session;
pub mod snap;
pub mod store;

// Re-exports for convenience
pub use config::EngineConfig;
pub use document::{CanvasDocument, Element, ElementType, SeriesSpec};
pub use error::EaselError;
pub use session::EditingSession;
pub use store::CanvasStore;
