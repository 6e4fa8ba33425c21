// Allow some clippy lints for builder heavy signatures
#![allow(clippy::too_many_arguments)]

pub mod allocator;
pub mod config;
pub mod delegation;
pub mod error;
pub mod ledger;
pub mod logger;
pub mod registrar;
pub mod retry;
pub mod scheduler;
pub mod signer;
pub mod simulator;
pub mod watcher;

pub use allocator::{Allocation, QueueSlotAllocator};
pub use config::ClientConfig;
pub use delegation::{AnchorDelegatedProgram, DelegatedProgram, DelegationLifecycleManager, Location};
pub use error::{ClientError, LedgerError};
pub use ledger::{Ledger, RpcLedger};
pub use registrar::{AuthorityRegistrar, Registration};
pub use retry::RetryPolicy;
pub use scheduler::{CompiledPayload, CronRequest, Payload, TaskHandle, TaskRequest, TaskScheduler};
pub use signer::{Keypair, Signer};
pub use watcher::{CompletionWatcher, Condition, WatchOutcome};

pub use tasklane_common as common;
