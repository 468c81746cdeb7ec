//! Instruction list -> canonical [`Message`].
//!
//! The layout is deterministic: the same instructions and options always
//! produce byte-identical messages. Account order is
//!
//!   1. fee payer (writable signer)
//!   2. remaining writable signers
//!   3. read-only signers
//!   4. writable non-signers
//!   5. read-only non-signers
//!
//! with ties kept in first-seen order. Non-signer accounts found in a
//! supplied lookup table are moved out of the static keys and referenced
//! through that table instead.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::LedgerError;
use crate::instruction::{AccountMeta, Instruction};
use crate::keys::{Hash, PublicKey};
use crate::message::{
    AddressTables, CompiledInstruction, Message, MessageAddressTableLookup, MessageHeader,
    MessageVersion, MAX_LEGACY_SIGNERS, MAX_LOOKUP_TABLE_LEN,
};

/// Upper bound on the combined static + looked-up key space.
pub const MAX_ACCOUNTS: usize = 256;

/// Knobs for [`compile`].
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Explicit fee payer. `None` or the all-zero key falls back to the
    /// first signer of the first instruction.
    pub fee_payer: Option<PublicKey>,
    /// Lookup table contents, in the order tables should be preferred.
    pub address_tables: Vec<(PublicKey, Vec<PublicKey>)>,
    /// Force a message version. By default V0 is used only when at least
    /// one account is looked up.
    pub version: Option<MessageVersion>,
}

impl CompileOptions {
    pub fn with_fee_payer(mut self, fee_payer: PublicKey) -> Self {
        self.fee_payer = Some(fee_payer);
        self
    }

    pub fn with_address_table(mut self, table: PublicKey, addresses: Vec<PublicKey>) -> Self {
        self.address_tables.push((table, addresses));
        self
    }

    pub fn with_version(mut self, version: MessageVersion) -> Self {
        self.version = Some(version);
        self
    }
}

/// Where an address lives in the supplied tables.
#[derive(Debug, Clone, Copy)]
struct TableSlot {
    table: usize,
    index: u8,
}

#[derive(Debug, Default)]
struct TableUse {
    writable_indexes: Vec<u8>,
    writable: Vec<PublicKey>,
    readonly_indexes: Vec<u8>,
    readonly: Vec<PublicKey>,
}

fn resolve_fee_payer<I: Instruction>(
    instructions: &[I],
    options: &CompileOptions,
) -> Result<PublicKey, LedgerError> {
    if let Some(payer) = options.fee_payer.filter(|k| !k.is_zero()) {
        return Ok(payer);
    }
    instructions
        .first()
        .and_then(|ix| ix.accounts().into_iter().find(|a| a.is_signer))
        .map(|a| a.pubkey)
        .ok_or(LedgerError::NoFeePayer)
}

/// First table, first index wins for addresses listed more than once.
fn index_tables(tables: &[(PublicKey, Vec<PublicKey>)]) -> Result<HashMap<PublicKey, TableSlot>, LedgerError> {
    let mut slots = HashMap::new();
    for (table_pos, (table_key, addresses)) in tables.iter().enumerate() {
        if addresses.len() > MAX_LOOKUP_TABLE_LEN {
            return Err(LedgerError::LookupTableTooLarge {
                table: table_key.to_string(),
                len: addresses.len(),
            });
        }
        for (index, address) in addresses.iter().enumerate() {
            slots.entry(*address).or_insert(TableSlot {
                table: table_pos,
                index: index as u8,
            });
        }
    }
    Ok(slots)
}

fn header_count(n: usize) -> Result<u8, LedgerError> {
    u8::try_from(n).map_err(|_| LedgerError::TooManyAccounts(n))
}

/// Compile `instructions` into a message.
///
/// The result is unresolved: lookup tables are referenced, not attached.
/// Call [`Message::set_address_tables`] and [`Message::resolve_lookups`] to
/// work with the full key space.
pub fn compile<I: Instruction>(
    instructions: &[I],
    recent_blockhash: Hash,
    options: &CompileOptions,
) -> Result<Message, LedgerError> {
    let fee_payer = resolve_fee_payer(instructions, options)?;
    let table_slots = index_tables(&options.address_tables)?;

    // Instruction accounts, then one read-only entry per distinct program.
    let mut accounts: Vec<AccountMeta> = Vec::new();
    let mut program_ids: Vec<PublicKey> = Vec::new();
    for ix in instructions {
        accounts.extend(ix.accounts());
        let program_id = ix.program_id();
        if !program_ids.contains(&program_id) {
            program_ids.push(program_id);
        }
    }
    accounts.extend(program_ids.iter().map(|p| AccountMeta::readonly(*p, false)));
    let invoked: HashSet<PublicKey> = program_ids.iter().copied().collect();

    // Signers first, then writable first. `sort_by_key` is stable.
    accounts.sort_by_key(|a| (!a.is_signer, !a.is_writable));

    let mut unique: Vec<AccountMeta> = Vec::with_capacity(accounts.len());
    let mut positions: HashMap<PublicKey, usize> = HashMap::new();
    for meta in accounts {
        match positions.get(&meta.pubkey) {
            Some(&pos) => unique[pos].is_writable |= meta.is_writable,
            None => {
                positions.insert(meta.pubkey, unique.len());
                unique.push(meta);
            }
        }
    }

    // Fee payer goes first as a writable signer, synthesised if absent.
    let mut ordered = Vec::with_capacity(unique.len() + 1);
    ordered.push(AccountMeta::writable(fee_payer, true));
    ordered.extend(unique.into_iter().filter(|a| a.pubkey != fee_payer));

    // Split static keys from looked-up ones.
    let mut static_keys: Vec<PublicKey> = Vec::with_capacity(ordered.len());
    let mut header = MessageHeader::default();
    let (mut signers, mut readonly_signed, mut readonly_unsigned) = (0usize, 0usize, 0usize);
    let mut table_use: Vec<TableUse> = Vec::new();
    table_use.resize_with(options.address_tables.len(), TableUse::default);

    for (pos, meta) in ordered.iter().enumerate() {
        let slot = table_slots.get(&meta.pubkey);
        if let Some(slot) = slot.filter(|_| pos != 0 && !meta.is_signer && !invoked.contains(&meta.pubkey)) {
            let entry = &mut table_use[slot.table];
            if meta.is_writable {
                entry.writable_indexes.push(slot.index);
                entry.writable.push(meta.pubkey);
            } else {
                entry.readonly_indexes.push(slot.index);
                entry.readonly.push(meta.pubkey);
            }
            continue;
        }

        static_keys.push(meta.pubkey);
        if meta.is_signer {
            signers += 1;
            if !meta.is_writable {
                readonly_signed += 1;
            }
        } else if !meta.is_writable {
            readonly_unsigned += 1;
        }
    }
    header.num_required_signatures = header_count(signers)?;
    header.num_readonly_signed_accounts = header_count(readonly_signed)?;
    header.num_readonly_unsigned_accounts = header_count(readonly_unsigned)?;

    // Lookups in table order, only for tables actually used.
    let mut lookups = Vec::new();
    let mut lookup_writable = Vec::new();
    let mut lookup_readonly = Vec::new();
    for ((table_key, _), used) in options.address_tables.iter().zip(table_use) {
        if used.writable.is_empty() && used.readonly.is_empty() {
            continue;
        }
        lookup_writable.extend(used.writable);
        lookup_readonly.extend(used.readonly);
        lookups.push(MessageAddressTableLookup {
            account_key: *table_key,
            writable_indexes: used.writable_indexes,
            readonly_indexes: used.readonly_indexes,
        });
    }

    // Global index space: static, lookup-writable, lookup-readonly.
    let total = static_keys.len() + lookup_writable.len() + lookup_readonly.len();
    if total > MAX_ACCOUNTS {
        return Err(LedgerError::TooManyAccounts(total));
    }
    let index_of: HashMap<PublicKey, u16> = static_keys
        .iter()
        .chain(&lookup_writable)
        .chain(&lookup_readonly)
        .enumerate()
        .map(|(i, key)| (*key, i as u16))
        .collect();
    let lookup_index = |key: &PublicKey| -> Result<u16, LedgerError> {
        index_of
            .get(key)
            .copied()
            .ok_or_else(|| LedgerError::InvalidInstruction(format!("account {key} missing from key space")))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let account_indices = ix
            .accounts()
            .iter()
            .map(|a| lookup_index(&a.pubkey))
            .collect::<Result<Vec<_>, _>>()?;
        compiled.push(CompiledInstruction {
            program_id_index: lookup_index(&ix.program_id())?,
            accounts: account_indices,
            data: ix.data()?,
        });
    }

    let version = match options.version {
        Some(MessageVersion::Legacy) if !lookups.is_empty() => {
            return Err(LedgerError::LookupsInLegacyMessage)
        }
        Some(version) => version,
        None if lookups.is_empty() => MessageVersion::Legacy,
        None => MessageVersion::V0,
    };
    if version == MessageVersion::Legacy && signers > MAX_LEGACY_SIGNERS {
        return Err(LedgerError::TooManyLegacySigners(signers));
    }

    debug!(
        fee_payer = %fee_payer,
        num_required_signatures = header.num_required_signatures,
        num_readonly_signed = header.num_readonly_signed_accounts,
        num_readonly_unsigned = header.num_readonly_unsigned_accounts,
        static_keys = static_keys.len(),
        lookups = lookups.len(),
        ?version,
        "compiled message"
    );

    Ok(Message::new(
        version,
        header,
        static_keys,
        recent_blockhash,
        compiled,
        lookups,
    ))
}

/// Lookup table contents of `options` as the map [`Message`] expects.
pub fn address_tables(options: &CompileOptions) -> AddressTables {
    options.address_tables.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::GenericInstruction;
    use crate::programs::{SystemInstruction, SYSTEM_PROGRAM_ID};

    fn key(text: &str) -> PublicKey {
        text.parse().unwrap()
    }

    fn k(b: u8) -> PublicKey {
        PublicKey::new([b; 32])
    }

    fn two_instruction_fixture() -> Vec<GenericInstruction> {
        vec![
            GenericInstruction::new(
                SYSTEM_PROGRAM_ID,
                vec![
                    AccountMeta::readonly(key("A9QnpgfhCkmiBSjgBuWk76Wo3HxzxvDopUq9x6UUMmjn"), true),
                    AccountMeta::writable(key("9hFtYBYmBJCVguRYs9pBTWKYAFoKfjYR7zBPpEkVsmD"), true),
                ],
                vec![0xaa, 0xbb],
            ),
            GenericInstruction::new(
                key("Vote111111111111111111111111111111111111111"),
                vec![
                    AccountMeta::readonly(key("SysvarC1ock11111111111111111111111111111111"), false),
                    AccountMeta::writable(key("SysvarS1otHashes111111111111111111111111111"), false),
                    AccountMeta::writable(key("9hFtYBYmBJCVguRYs9pBTWKYAFoKfjYR7zBPpEkVsmD"), false),
                    AccountMeta::readonly(key("6FzXPEhCJoBx7Zw3SN9qhekHemd6E2b8kVguitmVAngW"), true),
                ],
                vec![0xcc, 0xdd],
            ),
        ]
    }

    // -- ordering -----------------------------------------------------------

    #[test]
    fn two_instruction_layout() {
        let blockhash: Hash = "A9QnpgfhCkmiBSjgBuWk76Wo3HxzxvDopUq9x6UUMmjn".parse().unwrap();
        let msg = compile(&two_instruction_fixture(), blockhash, &CompileOptions::default()).unwrap();

        assert_eq!(msg.version, MessageVersion::Legacy);
        assert_eq!(
            msg.header,
            MessageHeader {
                num_required_signatures: 3,
                num_readonly_signed_accounts: 1,
                num_readonly_unsigned_accounts: 3,
            }
        );
        assert_eq!(msg.recent_blockhash, blockhash);
        assert_eq!(
            msg.account_keys,
            vec![
                key("A9QnpgfhCkmiBSjgBuWk76Wo3HxzxvDopUq9x6UUMmjn"),
                key("9hFtYBYmBJCVguRYs9pBTWKYAFoKfjYR7zBPpEkVsmD"),
                key("6FzXPEhCJoBx7Zw3SN9qhekHemd6E2b8kVguitmVAngW"),
                key("SysvarS1otHashes111111111111111111111111111"),
                key("SysvarC1ock11111111111111111111111111111111"),
                SYSTEM_PROGRAM_ID,
                key("Vote111111111111111111111111111111111111111"),
            ]
        );
        assert_eq!(
            msg.instructions,
            vec![
                CompiledInstruction {
                    program_id_index: 5,
                    accounts: vec![0, 1],
                    data: vec![0xaa, 0xbb],
                },
                CompiledInstruction {
                    program_id_index: 6,
                    accounts: vec![4, 3, 1, 2],
                    data: vec![0xcc, 0xdd],
                },
            ]
        );
    }

    #[test]
    fn compile_is_idempotent() {
        let ixs = two_instruction_fixture();
        let a = compile(&ixs, Hash::default(), &CompileOptions::default()).unwrap();
        let b = compile(&ixs, Hash::default(), &CompileOptions::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.serialize().unwrap(), b.serialize().unwrap());
    }

    #[test]
    fn readonly_and_writable_reference_dedups_to_writable() {
        let shared = k(9);
        let ixs = vec![
            GenericInstruction::new(k(1), vec![AccountMeta::writable(k(2), true), AccountMeta::readonly(shared, false)], vec![]),
            GenericInstruction::new(k(1), vec![AccountMeta::writable(shared, false)], vec![]),
        ];
        let msg = compile(&ixs, Hash::default(), &CompileOptions::default()).unwrap();
        assert_eq!(msg.account_keys.iter().filter(|key| **key == shared).count(), 1);
        let pos = msg.account_keys.iter().position(|key| *key == shared).unwrap();
        assert!(msg.is_writable(pos));
    }

    // -- fee payer ----------------------------------------------------------

    #[test]
    fn explicit_fee_payer_is_inserted_first() {
        let payer = k(0xfe);
        let ix = SystemInstruction::Transfer {
            from: k(1),
            to: k(2),
            lamports: 10,
        };
        let options = CompileOptions::default().with_fee_payer(payer);
        let msg = compile(&[ix], Hash::default(), &options).unwrap();
        assert_eq!(msg.account_keys[0], payer);
        assert_eq!(msg.header.num_required_signatures, 2);
        assert!(msg.is_signer(0) && msg.is_writable(0));
        assert_eq!(msg.account_keys[1], k(1));
    }

    #[test]
    fn zero_fee_payer_counts_as_unset() {
        let ix = SystemInstruction::Transfer {
            from: k(1),
            to: k(2),
            lamports: 10,
        };
        let options = CompileOptions::default().with_fee_payer(PublicKey::default());
        let msg = compile(&[ix], Hash::default(), &options).unwrap();
        assert_eq!(msg.account_keys[0], k(1));
    }

    #[test]
    fn fee_payer_moved_from_non_signer_position() {
        let payer = k(2);
        let ix = SystemInstruction::Transfer {
            from: k(1),
            to: payer,
            lamports: 10,
        };
        let options = CompileOptions::default().with_fee_payer(payer);
        let msg = compile(&[ix], Hash::default(), &options).unwrap();
        assert_eq!(msg.account_keys, vec![payer, k(1), SYSTEM_PROGRAM_ID]);
        assert_eq!(msg.header.num_required_signatures, 2);
        assert_eq!(msg.instructions[0].accounts, vec![1, 0]);
    }

    #[test]
    fn no_signer_no_fee_payer() {
        let ix = GenericInstruction::new(k(1), vec![AccountMeta::writable(k(2), false)], vec![]);
        assert_eq!(
            compile(&[ix], Hash::default(), &CompileOptions::default()),
            Err(LedgerError::NoFeePayer)
        );
        let none: [GenericInstruction; 0] = [];
        assert_eq!(
            compile(&none, Hash::default(), &CompileOptions::default()),
            Err(LedgerError::NoFeePayer)
        );
    }

    #[test]
    fn self_transfer_deduplicates_accounts() {
        let ix = SystemInstruction::Transfer {
            from: k(0xaa),
            to: k(0xaa),
            lamports: 100,
        };
        let msg = compile(&[ix], Hash::default(), &CompileOptions::default()).unwrap();
        // key (signer+writable), system program (read-only).
        assert_eq!(msg.account_keys.len(), 2);
        assert_eq!(msg.header.num_required_signatures, 1);
        assert_eq!(msg.header.num_readonly_unsigned_accounts, 1);
    }

    // -- lookup tables ------------------------------------------------------

    #[test]
    fn lookup_tables_compress_non_signers() {
        let program = k(0x50);
        let payer = k(1);
        let ix = GenericInstruction::new(
            program,
            vec![
                AccountMeta::writable(payer, true),
                AccountMeta::writable(k(0x10), false),
                AccountMeta::readonly(k(0x11), false),
                AccountMeta::writable(k(0x20), false),
                AccountMeta::readonly(k(0x30), false),
            ],
            vec![1],
        );
        let table_a = k(0xa0);
        let table_b = k(0xb0);
        let unused = k(0xc0);
        let options = CompileOptions::default()
            // payer and program are listed but must stay static.
            .with_address_table(table_a, vec![payer, program, k(0x10), k(0x11)])
            .with_address_table(unused, vec![k(0x77)])
            .with_address_table(table_b, vec![k(0x11), k(0x20)]);

        let msg = compile(&[ix], Hash::default(), &options).unwrap();
        assert_eq!(msg.version, MessageVersion::V0);
        assert_eq!(msg.account_keys, vec![payer, k(0x30), program]);
        assert_eq!(
            msg.header,
            MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 2,
            }
        );
        assert_eq!(
            msg.address_table_lookups,
            vec![
                MessageAddressTableLookup {
                    account_key: table_a,
                    writable_indexes: vec![2],
                    readonly_indexes: vec![3],
                },
                MessageAddressTableLookup {
                    account_key: table_b,
                    writable_indexes: vec![1],
                    readonly_indexes: vec![],
                },
            ]
        );
        // static(3) | writable: 0x10, 0x20 | readonly: 0x11
        assert_eq!(msg.instructions[0].program_id_index, 2);
        assert_eq!(msg.instructions[0].accounts, vec![0, 3, 5, 4, 1]);

        let mut resolved = msg.clone();
        resolved.set_address_tables(address_tables(&options)).unwrap();
        resolved.resolve_lookups().unwrap();
        let metas = resolved.instructions[0].resolve_accounts(&resolved).unwrap();
        assert_eq!(metas[1], AccountMeta::writable(k(0x10), false));
        assert_eq!(metas[2], AccountMeta::readonly(k(0x11), false));
        assert_eq!(metas[3], AccountMeta::writable(k(0x20), false));

        let bytes = msg.serialize().unwrap();
        assert_eq!(Message::deserialize(&bytes).unwrap(), msg);
    }

    #[test]
    fn oversized_table_rejected() {
        let ix = SystemInstruction::Transfer {
            from: k(1),
            to: k(2),
            lamports: 1,
        };
        let options = CompileOptions::default().with_address_table(k(0xa0), vec![k(3); 257]);
        assert!(matches!(
            compile(&[ix], Hash::default(), &options),
            Err(LedgerError::LookupTableTooLarge { len: 257, .. })
        ));
    }

    #[test]
    fn forced_v0_without_lookups() {
        let ix = SystemInstruction::Transfer {
            from: k(1),
            to: k(2),
            lamports: 1,
        };
        let options = CompileOptions::default().with_version(MessageVersion::V0);
        let msg = compile(&[ix], Hash::default(), &options).unwrap();
        assert_eq!(msg.version, MessageVersion::V0);
        assert!(msg.address_table_lookups.is_empty());
    }

    #[test]
    fn forced_legacy_with_lookups_rejected() {
        let ix = SystemInstruction::Transfer {
            from: k(1),
            to: k(2),
            lamports: 1,
        };
        let options = CompileOptions::default()
            .with_address_table(k(0xa0), vec![k(2)])
            .with_version(MessageVersion::Legacy);
        assert_eq!(
            compile(&[ix], Hash::default(), &options),
            Err(LedgerError::LookupsInLegacyMessage)
        );
    }

    fn wide_signer_instruction(count: u8) -> GenericInstruction {
        let accounts = (1..=count).map(|b| AccountMeta::writable(k(b), true)).collect();
        GenericInstruction::new(k(0xf0), accounts, vec![0])
    }

    #[test]
    fn legacy_signer_limit() {
        let options = CompileOptions::default();
        let at_limit = compile(&[wide_signer_instruction(127)], Hash::default(), &options).unwrap();
        assert_eq!(at_limit.header.num_required_signatures, 127);
        let bytes = at_limit.serialize().unwrap();
        assert_eq!(bytes[0], 127);
        assert_eq!(Message::deserialize(&bytes).unwrap(), at_limit);

        assert_eq!(
            compile(&[wide_signer_instruction(128)], Hash::default(), &options),
            Err(LedgerError::TooManyLegacySigners(128))
        );
    }

    #[test]
    fn wide_signer_set_compiles_as_v0() {
        let options = CompileOptions::default().with_version(MessageVersion::V0);
        let msg = compile(&[wide_signer_instruction(128)], Hash::default(), &options).unwrap();
        assert_eq!(msg.header.num_required_signatures, 128);

        let bytes = msg.serialize().unwrap();
        assert_eq!(&bytes[..2], &[crate::message::V0_PREFIX, 128]);
        assert_eq!(Message::deserialize(&bytes).unwrap(), msg);
    }

    #[test]
    fn heterogeneous_instruction_list() {
        let transfer = SystemInstruction::Transfer {
            from: k(1),
            to: k(2),
            lamports: 1,
        };
        let raw = GenericInstruction::new(k(0x40), vec![AccountMeta::readonly(k(3), false)], vec![7]);
        let ixs: Vec<&dyn Instruction> = vec![&transfer, &raw];
        let msg = compile(&ixs, Hash::default(), &CompileOptions::default()).unwrap();
        assert_eq!(msg.instructions.len(), 2);
        assert_eq!(msg.account_keys[0], k(1));
    }
}
