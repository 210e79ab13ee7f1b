//! Hard limits. Checked before anything is written to the WAL.

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CONTACT_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 8 * 1024;

pub const MAX_SERVICES: usize = 1_000;
pub const MAX_CLIENTS: usize = 1_000_000;
pub const MAX_APPOINTMENTS: usize = 5_000_000;

/// Slots in one day's list (weekly defaults or an override).
pub const MAX_SLOTS_PER_DAY: usize = 24 * 60;

/// Appointments settled in one batch (conflict resolution, override edits).
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Largest WAL record written or replayed. A longer length prefix is garbage.
pub const MAX_WAL_RECORD_BYTES: usize = 16 * 1024 * 1024;
