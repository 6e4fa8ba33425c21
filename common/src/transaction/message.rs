// Wire format of a signed transaction submitted to a ledger node
//
// message := header(3 bytes) | keys | recent blockhash | instructions
// Lengths are compact-u16 ("short vec") encoded.

use indexmap::IndexMap;

use super::{CompileError, Instruction};
use crate::crypto::{Hash, Pubkey, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Hash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compile `instructions` paid by `payer`, the payer is always the first key.
    pub fn new(
        instructions: &[Instruction],
        payer: &Pubkey,
        recent_blockhash: Hash,
    ) -> Result<Self, CompileError> {
        if instructions.is_empty() {
            return Err(CompileError::Empty);
        }

        // (is_signer, is_writable)
        let mut keys: IndexMap<Pubkey, (bool, bool)> = IndexMap::new();
        keys.insert(*payer, (true, true));
        for ix in instructions {
            for meta in ix.accounts.iter() {
                let flags = keys.entry(meta.pubkey).or_insert((false, false));
                flags.0 |= meta.is_signer;
                flags.1 |= meta.is_writable;
            }
            keys.entry(ix.program_id).or_insert((false, false));
        }

        let mut ordered: Vec<(Pubkey, (bool, bool))> = keys.into_iter().collect();
        // payer stays in front, it is a writable signer
        ordered.sort_by_key(|(key, (signer, writable))| {
            let class = match (signer, writable) {
                (true, true) => 0,
                (true, false) => 1,
                (false, true) => 2,
                (false, false) => 3,
            };
            (key != payer, class)
        });

        if ordered.len() > u8::MAX as usize {
            return Err(CompileError::TooManyAccounts(ordered.len()));
        }

        let header = MessageHeader {
            num_required_signatures: ordered.iter().filter(|(_, (s, _))| *s).count() as u8,
            num_readonly_signed_accounts: ordered.iter().filter(|(_, (s, w))| *s && !*w).count()
                as u8,
            num_readonly_unsigned_accounts: ordered
                .iter()
                .filter(|(_, (s, w))| !*s && !*w)
                .count() as u8,
        };

        let account_keys: Vec<Pubkey> = ordered.into_iter().map(|(key, _)| key).collect();
        let index_of = |key: &Pubkey| -> Result<u8, CompileError> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or(CompileError::UnknownAccount(*key))
        };

        let mut compiled = Vec::with_capacity(instructions.len());
        for ix in instructions {
            compiled.push(CompiledInstruction {
                program_id_index: index_of(&ix.program_id)?,
                accounts: ix
                    .accounts
                    .iter()
                    .map(|meta| index_of(&meta.pubkey))
                    .collect::<Result<Vec<u8>, CompileError>>()?,
                data: ix.data.clone(),
            });
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    // Keys that must sign, in order
    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.account_keys[..self.header.num_required_signatures as usize]
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);

        write_short_vec_len(&mut out, self.account_keys.len());
        for key in self.account_keys.iter() {
            out.extend_from_slice(key.as_ref());
        }

        out.extend_from_slice(self.recent_blockhash.as_ref());

        write_short_vec_len(&mut out, self.instructions.len());
        for ix in self.instructions.iter() {
            out.push(ix.program_id_index);
            write_short_vec_len(&mut out, ix.accounts.len());
            out.extend_from_slice(&ix.accounts);
            write_short_vec_len(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }

        out
    }
}

// Signatures followed by the serialized message
pub fn serialize_transaction(signatures: &[Signature], message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + signatures.len() * 64 + message.len());
    write_short_vec_len(&mut out, signatures.len());
    for signature in signatures {
        out.extend_from_slice(signature.as_bytes());
    }
    out.extend_from_slice(message);
    out
}

// compact-u16: 7 bits per byte, high bit set while more bytes follow
pub fn write_short_vec_len(out: &mut Vec<u8>, len: usize) {
    let mut value = len as u16;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        byte |= 0x80;
        out.push(byte);
    }
}
