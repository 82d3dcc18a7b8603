//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    /// Member profiles (keyed by identity provider uid)
    pub const MEMBERS: &str = "members";
    /// Amenity bookings (`memberId` names the booker)
    pub const BOOKINGS: &str = "bookings";
    /// Club events (`organizerId`, `attendees` uid list)
    pub const EVENTS: &str = "events";
}
