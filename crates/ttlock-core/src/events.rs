//! Lock record types and what they mean for the bolt.
//!
//! The cloud tags every pushed record with a numeric `recordType`. Only some
//! of them move the bolt; the rest are alarms, failed attempts or sensor
//! readings. [`EventCode::describe`] maps a code to an [`EventDescription`]
//! carrying the resulting [`Action`] and a human-readable reason that ends up
//! in the lock's `last_reason`.

use serde::{Deserialize, Serialize};

/// Effect an event has on the bolt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// The lock ended up locked.
    Lock,
    /// The lock ended up unlocked.
    Unlock,
    /// The bolt did not move, or we cannot tell.
    Unknown,
}

/// Meaning of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDescription {
    /// Effect on the bolt.
    pub action: Action,
    /// Reason shown to users.
    pub description: &'static str,
}

impl EventDescription {
    const fn new(action: Action, description: &'static str) -> Self {
        Self {
            action,
            description,
        }
    }
}

/// Record type code as pushed by the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCode(pub i64);

/// Door sensor reported the door closed.
pub const DOOR_SENSOR_CLOSED: EventCode = EventCode(30);

/// Door sensor reported the door open.
pub const DOOR_SENSOR_OPEN: EventCode = EventCode(31);

impl EventCode {
    /// Look the code up in the record type table.
    ///
    /// Unrecognised codes map to [`Action::Unknown`] with the description `"unknown"`.
    #[must_use]
    pub const fn describe(self) -> EventDescription {
        use Action::{Lock, Unknown, Unlock};

        let (action, description) = match self.0 {
            1 => (Unlock, "unlock by app"),
            4 => (Unlock, "unlock by passcode"),
            5 => (Unknown, "parking lock raised"),
            6 => (Unknown, "parking lock lowered"),
            7 => (Unlock, "unlock by IC card"),
            8 => (Unlock, "unlock by fingerprint"),
            9 => (Unlock, "unlock by wrist strap"),
            10 => (Unlock, "unlock by Mechanical key"),
            11 => (Lock, "lock by app"),
            12 => (Unlock, "unlock by gateway"),
            29 => (Unknown, "apply some force on the Lock"),
            30 => (Unknown, "Door sensor closed"),
            31 => (Unknown, "Door sensor open"),
            32 => (Unknown, "open from inside"),
            33 => (Lock, "lock by fingerprint"),
            34 => (Lock, "lock by passcode"),
            35 => (Lock, "lock by IC card"),
            36 => (Lock, "lock by Mechanical key"),
            37 => (Unknown, "Remote Control"),
            42 => (Unknown, "received new local mail"),
            43 => (Unknown, "received new other cities' mail"),
            44 => (Unknown, "Tamper alert"),
            45 => (Lock, "Auto Lock"),
            46 => (Unlock, "unlock by unlock key"),
            47 => (Lock, "lock by lock key"),
            48 => (
                Unknown,
                "System locked ( Caused by, for example: Using INVALID Passcode/Fingerprint/Card several times)",
            ),
            49 => (Unlock, "unlock by hotel card"),
            50 => (Unlock, "unlocked due to the high temperature"),
            51 => (Unknown, "Try to unlock with a deleted card"),
            52 => (Unknown, "Dead lock with APP"),
            53 => (Unknown, "Dead lock with passcode"),
            54 => (Unknown, "The car left (for parking lock)"),
            55 => (Unlock, "unlock with key fob"),
            57 => (Unlock, "unlock with QR code success"),
            58 => (Unknown, "Unlock with QR code failed, it's expired"),
            59 => (Unknown, "Double locked"),
            60 => (Unknown, "Cancel double lock"),
            61 => (Lock, "Lock with QR code success"),
            62 => (Unknown, "Lock with QR code failed, the lock is double locked"),
            63 => (Unlock, "auto unlock at passage mode"),
            64 => (Unknown, "Door not closed alarm"),
            65 => (Unknown, "Unlock timed out"),
            66 => (Unknown, "Lock timed out"),
            67 => (Unlock, "unlock by face"),
            68 => (Unknown, "Unlock by face failed, the lock is double locked"),
            69 => (Lock, "lock by face"),
            71 => (Unknown, "Unlock by face failed, it's expired"),
            75 => (Unlock, "unlock by app authorized button"),
            76 => (Unlock, "unlock by gateway authorized key"),
            77 => (Unlock, "unlock by dual authentication with app"),
            78 => (Unlock, "unlock by dual authentication with passcode"),
            79 => (Unlock, "unlock by dual authentication with fingerprint"),
            80 => (Unlock, "unlock by dual authentication with IC card"),
            81 => (Unlock, "unlock by dual authentication with face"),
            82 => (Unlock, "unlock by dual authentication with remote"),
            83 => (Unlock, "unlock by dual authentication with palm vein"),
            84 => (Unlock, "unlock by palm vein"),
            85 => (Unknown, "Unlock by palm vein failed, the lock is double locked"),
            86 => (Lock, "lock by palm vein"),
            88 => (Unknown, "Unlock by palm vein failed, it's expired"),
            91 => (Unknown, "Unlock by IC card failed"),
            92 => (Unlock, "unlock by administrator passcode"),
            _ => (Unknown, "unknown"),
        };

        EventDescription::new(action, description)
    }

    /// `true` for the two door-sensor records.
    #[must_use]
    pub const fn is_door_sensor(self) -> bool {
        matches!(self.0, 30 | 31)
    }
}
