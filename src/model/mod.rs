//! Model layer
//!
//! A [`Model`] names one collection. Registering it with a [`Db`] binds the
//! database's adapter to the model and provisions the collection; a model
//! that was never registered fails every operation with `NotRegistered`.
//!
//! [`Record`] is one instance of a model. Field mutations are tracked by
//! path so that `save` on a stored record only writes what changed.

mod db;
mod entity;
mod record;

pub use db::Db;
pub use entity::Model;
pub use record::Record;
