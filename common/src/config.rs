use std::str::FromStr;

use lazy_static::lazy_static;

use crate::crypto::Pubkey;

pub const VERSION: &str = env!("BUILD_VERSION");

// 1 SOL = 1 000 000 000 lamports
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

// System program is the all zero address
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::zero();

lazy_static! {
    // Task queue program serviced by the crankers
    pub static ref TUKTUK_PROGRAM_ID: Pubkey = program_id("tuktukUrfhXT6ZT77QTU8RQtvgL967uRuVagWF57zVA");
    // Recurring job program, posts into a task queue on schedule
    pub static ref CRON_PROGRAM_ID: Pubkey = program_id("cronAjRZnJn3MTP3B9kE62NWDrjSuAPVXf9c4hu4grM");
    // Owns delegated accounts on the base ledger
    pub static ref DELEGATION_PROGRAM_ID: Pubkey = program_id("DELeGGvXpWV2fqAcRCw7z3Cs5aV8wBzxJQ6NaJAxhyHG");
    // Rollup side program scheduling commits
    pub static ref MAGIC_PROGRAM_ID: Pubkey = program_id("Magic11111111111111111111111111111111111111");
    // Rollup side account collecting scheduled commits
    pub static ref MAGIC_CONTEXT_ID: Pubkey = program_id("MagicContext1111111111111111111111111111111");
}

fn program_id(value: &str) -> Pubkey {
    match Pubkey::from_str(value) {
        Ok(key) => key,
        Err(e) => panic!("invalid built-in program id {}: {}", value, e),
    }
}

// Seeds of the task queue program
pub const TASK_SEED: &[u8] = b"task";
pub const TASK_QUEUE_AUTHORITY_SEED: &[u8] = b"task_queue_authority";

// Seed used by programs that queue tasks through their own derived authority
pub const QUEUE_AUTHORITY_SEED: &[u8] = b"queue_authority";

// Seeds of the cron program
pub const CRON_JOB_SEED: &[u8] = b"cron_job";
pub const CRON_JOB_NAME_MAPPING_SEED: &[u8] = b"cron_job_name_mapping";
pub const CRON_JOB_TRANSACTION_SEED: &[u8] = b"cron_job_transaction";
pub const USER_CRON_JOBS_SEED: &[u8] = b"user_cron_jobs";

// Seeds of delegated user state
pub const USER_SEED: &[u8] = b"user";
pub const ESCROW_SEED: &[u8] = b"escrow";
pub const DELEGATION_RECORD_SEED: &[u8] = b"delegation";
pub const DELEGATION_METADATA_SEED: &[u8] = b"delegation-metadata";
pub const DELEGATE_BUFFER_SEED: &[u8] = b"buffer";

// Capacity added to a full task queue by a resize request
pub const DEFAULT_CAPACITY_INCREMENT: u16 = 10;
// Reward paid to the cranker executing a task
pub const DEFAULT_CRANK_REWARD: u64 = 5_000_000;
// Lamports transferred to a new cron job to pay for its submissions
pub const DEFAULT_CRON_FUNDING: u64 = LAMPORTS_PER_SOL / 50;
// Every minute, at second 0
pub const DEFAULT_CRON_SCHEDULE: &str = "0 * * * * *";

// Longest description stored with a queued task
pub const MAX_TASK_DESCRIPTION_LEN: usize = 40;
// Longest cron job name, it is used as a seed
pub const MAX_CRON_NAME_LEN: usize = 32;
