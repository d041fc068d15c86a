//! gk-sync: local-first vault sync against an untrusted custody service
//!
//! The engine diffs a vault snapshot against its commit markers, seals every
//! field with the vault's data key, pushes the result, and settles the
//! markers once the remote acknowledges. Profile and vault lifecycle
//! operations (create, import, switch, transfer) live alongside it because
//! their guards depend on sync state.

pub mod codec;
pub mod diff;
pub mod engine;
pub mod error;
pub mod keys;
pub mod profiles;
pub mod remote;
pub mod vaults;
pub mod wire;

pub use diff::{compute_diff, Change, VaultDiff};
pub use engine::{ImportReport, PullReport, SyncEngine, SyncOptions, SyncReport, VaultStatus};
pub use error::{SyncError, SyncResult};
pub use keys::KeySession;
pub use profiles::IdentityParams;
pub use remote::{FileRemote, MemoryRemote, RemoteError, RemoteVaultService, VetKdArgs};
pub use vaults::Confirmation;
pub use wire::RemoteVaultData;
