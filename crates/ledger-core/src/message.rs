//! Compiled messages and their wire format.
//!
//! ```text
//! Legacy message:
//!   num_required_sigs     u8
//!   num_readonly_signed   u8
//!   num_readonly_unsigned u8
//!   num_accounts          compact-u16
//!   account_keys          32 bytes * num_accounts
//!   recent_blockhash      32 bytes
//!   num_instructions      compact-u16
//!   instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index      u8
//!   num_accounts          compact-u16
//!   account_indices       u8 * num_accounts
//!   data_len              compact-u16
//!   data                  u8 * data_len
//!
//! V0 message:
//!   version               u8 (0x80)
//!   <legacy message>
//!   num_lookups           u8
//!   lookups[]:
//!     table_key           32 bytes
//!     num_writable        compact-u16
//!     writable_indexes    u8 * num_writable
//!     num_readonly        compact-u16
//!     readonly_indexes    u8 * num_readonly
//! ```
//!
//! A legacy message starts with `num_required_sigs`, which is always at most
//! 127, so the first byte alone tells the two formats apart.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::codec::{write_compact_len, Cursor};
use crate::error::LedgerError;
use crate::instruction::AccountMeta;
use crate::keys::{Hash, PublicKey, HASH_LENGTH, PUBLIC_KEY_LENGTH};

/// Set on the first byte of a versioned message.
pub const VERSION_PREFIX_MASK: u8 = 0x80;

/// Version byte of a V0 message.
pub const V0_PREFIX: u8 = VERSION_PREFIX_MASK;

/// Legacy messages start with the signer count, so it must stay below the
/// version bit.
pub const MAX_LEGACY_SIGNERS: usize = VERSION_PREFIX_MASK as usize - 1;

/// Max addresses a single lookup table can hold.
pub const MAX_LOOKUP_TABLE_LEN: usize = 256;

/// Address lookup table contents, keyed by table address.
pub type AddressTables = HashMap<PublicKey, Vec<PublicKey>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageVersion {
    #[default]
    Legacy,
    V0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

impl MessageHeader {
    /// Check the counts against the number of static keys: the signers must
    /// exist, the fee payer must be writable and the read-only unsigned
    /// accounts must fit after the signers.
    pub fn validate(&self, num_static_keys: usize) -> Result<(), LedgerError> {
        let signers = self.num_required_signatures as usize;
        if signers > num_static_keys {
            return Err(LedgerError::InvalidHeader(format!(
                "{signers} required signatures but only {num_static_keys} account keys"
            )));
        }
        if self.num_readonly_signed_accounts >= self.num_required_signatures {
            return Err(LedgerError::InvalidHeader(format!(
                "{} read-only signers out of {signers} signers",
                self.num_readonly_signed_accounts
            )));
        }
        if self.num_readonly_unsigned_accounts as usize > num_static_keys - signers {
            return Err(LedgerError::InvalidHeader(format!(
                "{} read-only unsigned accounts but only {} unsigned keys",
                self.num_readonly_unsigned_accounts,
                num_static_keys - signers
            )));
        }
        Ok(())
    }
}

/// An instruction whose program and accounts are indices into the message
/// key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u16,
    pub accounts: Vec<u16>,
    pub data: Vec<u8>,
}

impl CompiledInstruction {
    /// The invoked program.
    pub fn program_id(&self, message: &Message) -> Result<PublicKey, LedgerError> {
        let index = self.program_id_index as usize;
        message
            .account(index)
            .ok_or(LedgerError::AccountIndexOutOfRange(index))
    }

    /// Turn account indices back into [`AccountMeta`]s.
    ///
    /// Lookup-table accounts need a resolved message.
    pub fn resolve_accounts(&self, message: &Message) -> Result<Vec<AccountMeta>, LedgerError> {
        self.accounts
            .iter()
            .map(|&index| {
                let index = index as usize;
                let pubkey = message
                    .account(index)
                    .ok_or(LedgerError::AccountIndexOutOfRange(index))?;
                Ok(AccountMeta::new(
                    pubkey,
                    message.is_signer(index),
                    message.is_writable(index),
                ))
            })
            .collect()
    }
}

/// Accounts a V0 message loads from one address lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAddressTableLookup {
    pub account_key: PublicKey,
    pub writable_indexes: Vec<u8>,
    pub readonly_indexes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub version: MessageVersion,
    pub header: MessageHeader,
    /// Static keys. Once resolved, followed by the writable then read-only
    /// lookup keys.
    pub account_keys: Vec<PublicKey>,
    pub recent_blockhash: Hash,
    pub instructions: Vec<CompiledInstruction>,
    pub address_table_lookups: Vec<MessageAddressTableLookup>,
    address_tables: Option<AddressTables>,
    resolved: bool,
}

impl Message {
    pub fn new(
        version: MessageVersion,
        header: MessageHeader,
        account_keys: Vec<PublicKey>,
        recent_blockhash: Hash,
        instructions: Vec<CompiledInstruction>,
        address_table_lookups: Vec<MessageAddressTableLookup>,
    ) -> Self {
        Self {
            version,
            header,
            account_keys,
            recent_blockhash,
            instructions,
            address_table_lookups,
            address_tables: None,
            resolved: false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Accounts loaded from all lookup tables.
    pub fn num_lookups(&self) -> usize {
        self.address_table_lookups
            .iter()
            .map(|l| l.writable_indexes.len() + l.readonly_indexes.len())
            .sum()
    }

    pub fn num_writable_lookups(&self) -> usize {
        self.address_table_lookups
            .iter()
            .map(|l| l.writable_indexes.len())
            .sum()
    }

    pub fn num_static_accounts(&self) -> usize {
        if self.resolved {
            self.account_keys.len().saturating_sub(self.num_lookups())
        } else {
            self.account_keys.len()
        }
    }

    /// Keys carried in the message body itself.
    pub fn static_keys(&self) -> &[PublicKey] {
        &self.account_keys[..self.num_static_accounts()]
    }

    /// The required signers, in signature order.
    pub fn signer_keys(&self) -> &[PublicKey] {
        let n = (self.header.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    /// The key at `index` in the resolved key space.
    pub fn account(&self, index: usize) -> Option<PublicKey> {
        self.account_keys.get(index).copied()
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.header.num_required_signatures as usize
    }

    /// Writability by position: static writable signers, static read-only
    /// signers, static writable non-signers, static read-only non-signers,
    /// then writable lookups, then read-only lookups.
    pub fn is_writable(&self, index: usize) -> bool {
        let num_static = self.num_static_accounts();
        if index >= num_static {
            return index - num_static < self.num_writable_lookups();
        }

        let signers = self.header.num_required_signatures as usize;
        if index < signers {
            let writable_signers =
                signers.saturating_sub(self.header.num_readonly_signed_accounts as usize);
            return index < writable_signers;
        }

        let writable_unsigned = num_static
            .saturating_sub(signers)
            .saturating_sub(self.header.num_readonly_unsigned_accounts as usize);
        index - signers < writable_unsigned
    }

    pub fn address_tables(&self) -> Option<&AddressTables> {
        self.address_tables.as_ref()
    }

    /// Attach lookup table contents. Tables can only be set once.
    pub fn set_address_tables(&mut self, tables: AddressTables) -> Result<(), LedgerError> {
        if self.address_tables.is_some() {
            return Err(LedgerError::AddressTablesAlreadySet);
        }
        self.address_tables = Some(tables);
        Ok(())
    }

    /// Append every looked-up key after the static keys (all writable
    /// lookups first, then all read-only ones) and mark the message resolved.
    pub fn resolve_lookups(&mut self) -> Result<(), LedgerError> {
        if self.resolved {
            return Ok(());
        }
        if self.address_table_lookups.is_empty() {
            self.resolved = true;
            return Ok(());
        }

        let tables = self
            .address_tables
            .as_ref()
            .ok_or_else(|| {
                LedgerError::MissingAddressTable(self.address_table_lookups[0].account_key.to_string())
            })?;

        let mut writable = Vec::with_capacity(self.num_writable_lookups());
        let mut readonly = Vec::new();
        for lookup in &self.address_table_lookups {
            let table = tables
                .get(&lookup.account_key)
                .ok_or_else(|| LedgerError::MissingAddressTable(lookup.account_key.to_string()))?;
            let fetch = |index: u8| {
                table
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| LedgerError::LookupIndexOutOfRange {
                        table: lookup.account_key.to_string(),
                        index,
                    })
            };
            for &index in &lookup.writable_indexes {
                writable.push(fetch(index)?);
            }
            for &index in &lookup.readonly_indexes {
                readonly.push(fetch(index)?);
            }
        }

        self.account_keys.extend(writable);
        self.account_keys.extend(readonly);
        self.resolved = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Serialize the message: these are the bytes that get signed.
    pub fn serialize(&self) -> Result<Vec<u8>, LedgerError> {
        let static_keys = self.static_keys();
        let mut buf = Vec::with_capacity(
            1 + 3 + 3 + static_keys.len() * PUBLIC_KEY_LENGTH + HASH_LENGTH + 64,
        );

        if self.version == MessageVersion::V0 {
            buf.push(V0_PREFIX);
        } else if !self.address_table_lookups.is_empty() {
            return Err(LedgerError::LookupsInLegacyMessage);
        } else if self.header.num_required_signatures as usize > MAX_LEGACY_SIGNERS {
            return Err(LedgerError::TooManyLegacySigners(
                self.header.num_required_signatures as usize,
            ));
        }

        // Header: 3 bytes.
        buf.push(self.header.num_required_signatures);
        buf.push(self.header.num_readonly_signed_accounts);
        buf.push(self.header.num_readonly_unsigned_accounts);

        // Account keys.
        write_compact_len(&mut buf, static_keys.len())?;
        for key in static_keys {
            buf.extend_from_slice(key.as_bytes());
        }

        // Recent blockhash.
        buf.extend_from_slice(self.recent_blockhash.as_bytes());

        // Instructions.
        write_compact_len(&mut buf, self.instructions.len())?;
        for ix in &self.instructions {
            buf.push(wire_index(ix.program_id_index)?);

            write_compact_len(&mut buf, ix.accounts.len())?;
            for &index in &ix.accounts {
                buf.push(wire_index(index)?);
            }

            write_compact_len(&mut buf, ix.data.len())?;
            buf.extend_from_slice(&ix.data);
        }

        if self.version == MessageVersion::V0 {
            let count = u8::try_from(self.address_table_lookups.len())
                .map_err(|_| LedgerError::LengthOverflow(self.address_table_lookups.len()))?;
            buf.push(count);
            for lookup in &self.address_table_lookups {
                buf.extend_from_slice(lookup.account_key.as_bytes());
                write_compact_len(&mut buf, lookup.writable_indexes.len())?;
                buf.extend_from_slice(&lookup.writable_indexes);
                write_compact_len(&mut buf, lookup.readonly_indexes.len())?;
                buf.extend_from_slice(&lookup.readonly_indexes);
            }
        }

        Ok(buf)
    }

    /// Decode a message that occupies all of `data`.
    pub fn deserialize(data: &[u8]) -> Result<Self, LedgerError> {
        let mut cursor = Cursor::new(data);
        let message = Self::read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(LedgerError::TrailingBytes(cursor.remaining()));
        }
        Ok(message)
    }

    pub fn to_base64(&self) -> Result<String, LedgerError> {
        Ok(BASE64.encode(self.serialize()?))
    }

    pub fn from_base64(text: &str) -> Result<Self, LedgerError> {
        let bytes = BASE64
            .decode(text)
            .map_err(|e| LedgerError::InvalidBase64(e.to_string()))?;
        Self::deserialize(&bytes)
    }

    /// Decode one message from the cursor, leaving any bytes after it.
    pub(crate) fn read_from(cursor: &mut Cursor<'_>) -> Result<Self, LedgerError> {
        let first = cursor.peek(1)?[0];
        let version = if first & VERSION_PREFIX_MASK == 0 {
            MessageVersion::Legacy
        } else if first == V0_PREFIX {
            cursor.read_u8()?;
            MessageVersion::V0
        } else {
            return Err(LedgerError::InvalidVersion(first));
        };

        let header = MessageHeader {
            num_required_signatures: cursor.read_u8()?,
            num_readonly_signed_accounts: cursor.read_u8()?,
            num_readonly_unsigned_accounts: cursor.read_u8()?,
        };

        let num_keys = cursor.read_count("account key", PUBLIC_KEY_LENGTH)?;
        let mut account_keys = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            account_keys.push(PublicKey(cursor.read_array()?));
        }
        header.validate(num_keys)?;

        let recent_blockhash = Hash(cursor.read_array()?);

        // Smallest instruction: program index plus two empty length prefixes.
        let num_instructions = cursor.read_count("instruction", 3)?;
        let mut instructions = Vec::with_capacity(num_instructions);
        for _ in 0..num_instructions {
            let program_id_index = cursor.read_u8()? as u16;

            let num_accounts = cursor.read_count("instruction account", 1)?;
            let accounts = cursor
                .read_exact(num_accounts)?
                .iter()
                .map(|&i| i as u16)
                .collect();

            let data_len = cursor.read_count("instruction data byte", 1)?;
            let data = cursor.read_exact(data_len)?.to_vec();

            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        let mut address_table_lookups = Vec::new();
        if version == MessageVersion::V0 {
            let count = cursor.read_u8()? as usize;
            // Smallest lookup: table key plus two empty length prefixes.
            let min_len = PUBLIC_KEY_LENGTH + 2;
            if count * min_len > cursor.remaining() {
                return Err(LedgerError::CountOverflow {
                    what: "address table lookup",
                    count,
                    remaining: cursor.remaining(),
                });
            }
            address_table_lookups.reserve(count);
            for _ in 0..count {
                let account_key = PublicKey(cursor.read_array()?);
                let num_writable = cursor.read_count("writable index", 1)?;
                let writable_indexes = cursor.read_exact(num_writable)?.to_vec();
                let num_readonly = cursor.read_count("readonly index", 1)?;
                let readonly_indexes = cursor.read_exact(num_readonly)?.to_vec();
                address_table_lookups.push(MessageAddressTableLookup {
                    account_key,
                    writable_indexes,
                    readonly_indexes,
                });
            }
        }

        Ok(Self::new(
            version,
            header,
            account_keys,
            recent_blockhash,
            instructions,
            address_table_lookups,
        ))
    }
}

fn wire_index(index: u16) -> Result<u8, LedgerError> {
    u8::try_from(index).map_err(|_| LedgerError::IndexOverflow(index as usize))
}
