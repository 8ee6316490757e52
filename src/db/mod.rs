//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    /// Members keyed by Open Humans project member ID
    pub const MEMBERS: &str = "members";
}
