// Seed layouts of the records this client reads and writes
//
// Numeric seeds use fixed width little endian encodings:
// task ids are 2 bytes, cron ids and transaction indices 4 bytes, user seeds 8 bytes.

use crate::{
    config::{
        CRON_JOB_NAME_MAPPING_SEED, CRON_JOB_SEED, CRON_JOB_TRANSACTION_SEED, CRON_PROGRAM_ID,
        DELEGATE_BUFFER_SEED, DELEGATION_METADATA_SEED, DELEGATION_PROGRAM_ID,
        DELEGATION_RECORD_SEED, ESCROW_SEED, QUEUE_AUTHORITY_SEED, TASK_QUEUE_AUTHORITY_SEED,
        TASK_SEED, TUKTUK_PROGRAM_ID, USER_CRON_JOBS_SEED, USER_SEED,
    },
    crypto::{find_program_address, CryptoError, Pubkey},
};

/// Derive the canonical address of `parts` under the `namespace` program.
pub fn derive(namespace: &Pubkey, parts: &[&[u8]]) -> Result<Pubkey, CryptoError> {
    find_program_address(parts, namespace).map(|(address, _)| address)
}

// Slot `task_id` of a task queue
pub fn task_key(task_queue: &Pubkey, task_id: u16) -> Result<Pubkey, CryptoError> {
    derive(
        &TUKTUK_PROGRAM_ID,
        &[TASK_SEED, task_queue.as_ref(), &task_id.to_le_bytes()],
    )
}

// Record authorizing `queue_authority` to queue tasks on `task_queue`
pub fn task_queue_authority_key(
    task_queue: &Pubkey,
    queue_authority: &Pubkey,
) -> Result<Pubkey, CryptoError> {
    derive(
        &TUKTUK_PROGRAM_ID,
        &[
            TASK_QUEUE_AUTHORITY_SEED,
            task_queue.as_ref(),
            queue_authority.as_ref(),
        ],
    )
}

// Derived signer a program uses when it queues tasks itself
pub fn program_queue_authority_key(program_id: &Pubkey) -> Result<(Pubkey, u8), CryptoError> {
    find_program_address(&[QUEUE_AUTHORITY_SEED], program_id)
}

pub fn user_cron_jobs_key(authority: &Pubkey) -> Result<Pubkey, CryptoError> {
    derive(&CRON_PROGRAM_ID, &[USER_CRON_JOBS_SEED, authority.as_ref()])
}

pub fn cron_job_key(authority: &Pubkey, cron_job_id: u32) -> Result<Pubkey, CryptoError> {
    derive(
        &CRON_PROGRAM_ID,
        &[CRON_JOB_SEED, authority.as_ref(), &cron_job_id.to_le_bytes()],
    )
}

// Name lookup record pointing at the cron job of `authority` called `name`
pub fn cron_job_name_mapping_key(authority: &Pubkey, name: &str) -> Result<Pubkey, CryptoError> {
    derive(
        &CRON_PROGRAM_ID,
        &[
            CRON_JOB_NAME_MAPPING_SEED,
            authority.as_ref(),
            name.as_bytes(),
        ],
    )
}

pub fn cron_job_transaction_key(cron_job: &Pubkey, index: u32) -> Result<Pubkey, CryptoError> {
    derive(
        &CRON_PROGRAM_ID,
        &[
            CRON_JOB_TRANSACTION_SEED,
            cron_job.as_ref(),
            &index.to_le_bytes(),
        ],
    )
}

// Per user state account owned by `program_id`
pub fn user_state_key(program_id: &Pubkey, user: &Pubkey) -> Result<Pubkey, CryptoError> {
    derive(program_id, &[USER_SEED, user.as_ref()])
}

pub fn escrow_key(program_id: &Pubkey, maker: &Pubkey, seed: u64) -> Result<Pubkey, CryptoError> {
    derive(
        program_id,
        &[ESCROW_SEED, maker.as_ref(), &seed.to_le_bytes()],
    )
}

pub fn delegation_record_key(delegated: &Pubkey) -> Result<Pubkey, CryptoError> {
    derive(
        &DELEGATION_PROGRAM_ID,
        &[DELEGATION_RECORD_SEED, delegated.as_ref()],
    )
}

pub fn delegation_metadata_key(delegated: &Pubkey) -> Result<Pubkey, CryptoError> {
    derive(
        &DELEGATION_PROGRAM_ID,
        &[DELEGATION_METADATA_SEED, delegated.as_ref()],
    )
}

// Buffer the owner program fills while handing an account to the delegation program
pub fn delegate_buffer_key(owner_program: &Pubkey, delegated: &Pubkey) -> Result<Pubkey, CryptoError> {
    derive(owner_program, &[DELEGATE_BUFFER_SEED, delegated.as_ref()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::create_program_address;

    #[test]
    fn test_task_key_uses_two_byte_index() {
        let queue = Pubkey::new([3u8; 32]);
        let (expected, _) = find_program_address(
            &[TASK_SEED, queue.as_ref(), &[7u8, 0u8]],
            &TUKTUK_PROGRAM_ID,
        )
        .unwrap();
        assert_eq!(task_key(&queue, 7).unwrap(), expected);
        assert_ne!(task_key(&queue, 7).unwrap(), task_key(&queue, 8).unwrap());
    }

    #[test]
    fn test_escrow_key_uses_eight_byte_seed() {
        let program = Pubkey::new([1u8; 32]);
        let maker = Pubkey::new([2u8; 32]);
        let (expected, bump) = find_program_address(
            &[ESCROW_SEED, maker.as_ref(), &[5, 0, 0, 0, 0, 0, 0, 0]],
            &program,
        )
        .unwrap();
        assert_eq!(escrow_key(&program, &maker, 5).unwrap(), expected);
        let exact = create_program_address(
            &[ESCROW_SEED, maker.as_ref(), &5u64.to_le_bytes(), &[bump]],
            &program,
        )
        .unwrap();
        assert_eq!(exact, expected);
    }

    #[test]
    fn test_authority_records_are_per_submitter() {
        let queue = Pubkey::new([3u8; 32]);
        let a = task_queue_authority_key(&queue, &Pubkey::new([4u8; 32])).unwrap();
        let b = task_queue_authority_key(&queue, &Pubkey::new([5u8; 32])).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_cron_name_too_long_is_rejected() {
        let authority = Pubkey::new([4u8; 32]);
        let name = "n".repeat(33);
        assert!(matches!(
            cron_job_name_mapping_key(&authority, &name),
            Err(CryptoError::SeedTooLong { index: 2, .. })
        ));
    }
}
