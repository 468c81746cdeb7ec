//! End-to-end: instructions -> message -> signed transaction -> wire -> back.

use ledger_core::message::AddressTables;
use ledger_core::programs::{
    default_registry, AssociatedTokenInstruction, ProgramInstruction, SystemInstruction,
    TokenInstruction, NATIVE_MINT,
};
use ledger_core::{
    compile, find_associated_token_address, AccountMeta, CompileOptions, GenericInstruction, Hash,
    Instruction, LedgerError, Message, MessageVersion, PrivateKey, PublicKey, Transaction,
};
use rand::{Rng, RngCore};

fn random_key(rng: &mut impl RngCore) -> PublicKey {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    PublicKey::new(bytes)
}

// -- legacy -----------------------------------------------------------------

#[test]
fn wrap_native_pipeline() {
    let owner = PrivateKey::generate();
    let wallet = owner.public_key();
    let (ata, _) = find_associated_token_address(&wallet, &NATIVE_MINT).unwrap();

    let create = AssociatedTokenInstruction::create(wallet, wallet, NATIVE_MINT).unwrap();
    let fund = SystemInstruction::Transfer {
        from: wallet,
        to: ata,
        lamports: 5_000_000,
    };
    let sync = TokenInstruction::SyncNative { account: ata };
    let instructions: Vec<&dyn Instruction> = vec![&create, &fund, &sync];

    let blockhash = Hash::new([0x11; 32]);
    let mut tx = Transaction::new(&instructions, blockhash, &CompileOptions::default()).unwrap();
    assert_eq!(tx.message.version, MessageVersion::Legacy);
    assert_eq!(tx.message.account_keys[0], wallet);
    assert_eq!(tx.message.header.num_required_signatures, 1);

    tx.sign(&owner).unwrap();
    let wire = tx.serialize_base64().unwrap();

    let decoded = Transaction::from_base64(&wire).unwrap();
    assert_eq!(decoded, tx);
    decoded.verify_signatures().unwrap();

    // Every instruction decodes back to what went in.
    let registry = default_registry().unwrap();
    let mut seen = Vec::new();
    for ix in &decoded.message.instructions {
        let program_id = ix.program_id(&decoded.message).unwrap();
        let accounts = ix.resolve_accounts(&decoded.message).unwrap();
        seen.push(registry.decode(&program_id, &accounts, &ix.data).unwrap());
    }
    assert_eq!(
        seen,
        vec![
            ProgramInstruction::AssociatedToken(create),
            ProgramInstruction::System(fund),
            ProgramInstruction::Token(sync),
        ]
    );
}

#[test]
fn multi_signer_partial_then_full() {
    let payer = PrivateKey::generate();
    let other = PrivateKey::generate();
    let new_account = PrivateKey::generate();

    let create = SystemInstruction::CreateAccount {
        funding: payer.public_key(),
        new_account: new_account.public_key(),
        lamports: 1_000,
        space: 0,
        owner: PublicKey::new([0x33; 32]),
    };
    let cosign = GenericInstruction::new(
        PublicKey::new([0x44; 32]),
        vec![AccountMeta::readonly(other.public_key(), true)],
        vec![],
    );
    let instructions: Vec<&dyn Instruction> = vec![&create, &cosign];
    let mut tx = Transaction::new(&instructions, Hash::default(), &CompileOptions::default()).unwrap();
    assert_eq!(tx.message.header.num_required_signatures, 3);
    assert_eq!(tx.message.header.num_readonly_signed_accounts, 1);

    let err = tx.sign(&[payer.clone(), new_account.clone()]).unwrap_err();
    assert!(matches!(err, LedgerError::MissingSigner(_)));
    assert!(tx.signatures.is_empty());

    tx.partial_sign(&[payer.clone(), new_account.clone()]).unwrap();
    assert!(!tx.is_signed());

    // Ship it to the last signer over the wire.
    let mut remote = Transaction::deserialize(&tx.serialize().unwrap()).unwrap();
    remote.partial_sign(&other).unwrap();
    assert!(remote.is_signed());
    remote.verify_signatures().unwrap();
}

// -- v0 ---------------------------------------------------------------------

#[test]
fn v0_with_lookup_tables_pipeline() {
    let mut rng = rand::thread_rng();
    let payer = PrivateKey::generate();
    let program = random_key(&mut rng);
    let table_key = random_key(&mut rng);

    let table: Vec<PublicKey> = (0..40).map(|_| random_key(&mut rng)).collect();
    let ix = GenericInstruction::new(
        program,
        vec![
            AccountMeta::writable(payer.public_key(), true),
            AccountMeta::writable(table[3], false),
            AccountMeta::readonly(table[17], false),
            AccountMeta::readonly(table[39], false),
        ],
        vec![0xde, 0xad],
    );

    let options = CompileOptions::default().with_address_table(table_key, table.clone());
    let message = compile(&[&ix], Hash::new([0x22; 32]), &options).unwrap();
    assert_eq!(message.version, MessageVersion::V0);
    assert_eq!(message.account_keys, vec![payer.public_key(), program]);
    assert_eq!(message.address_table_lookups.len(), 1);
    assert_eq!(message.address_table_lookups[0].writable_indexes, vec![3]);
    assert_eq!(message.address_table_lookups[0].readonly_indexes, vec![17, 39]);

    let mut tx = Transaction::from_message(message);
    tx.sign(&payer).unwrap();

    let bytes = tx.serialize().unwrap();
    assert_eq!(bytes[1 + 64], 0x80);
    let mut decoded = Transaction::deserialize(&bytes).unwrap();
    assert_eq!(decoded, tx);
    decoded.verify_signatures().unwrap();

    let mut tables = AddressTables::new();
    tables.insert(table_key, table.clone());
    decoded.message.set_address_tables(tables).unwrap();
    decoded.message.resolve_lookups().unwrap();
    let accounts = decoded.message.instructions[0]
        .resolve_accounts(&decoded.message)
        .unwrap();
    assert_eq!(accounts, ix.accounts);

    // Resolution does not change what was signed.
    decoded.verify_signatures().unwrap();
}

// -- properties -------------------------------------------------------------

#[test]
fn random_messages_roundtrip() {
    let mut rng = rand::thread_rng();

    for _ in 0..50 {
        let signer_count = rng.gen_range(1..4);
        let signers: Vec<PublicKey> = (0..signer_count).map(|_| random_key(&mut rng)).collect();
        let pool: Vec<PublicKey> = (0..12).map(|_| random_key(&mut rng)).collect();

        let instructions: Vec<GenericInstruction> = (0..rng.gen_range(1..5))
            .map(|i| {
                let mut accounts = vec![AccountMeta::writable(signers[i % signers.len()], true)];
                for _ in 0..rng.gen_range(0..6) {
                    let key = pool[rng.gen_range(0..pool.len())];
                    accounts.push(AccountMeta::new(key, false, rng.gen_bool(0.5)));
                }
                let data: Vec<u8> = (0..rng.gen_range(0..40)).map(|_| rng.gen()).collect();
                GenericInstruction::new(pool[rng.gen_range(0..3)], accounts, data)
            })
            .collect();

        let mut options = CompileOptions::default();
        if rng.gen_bool(0.5) {
            options = options.with_address_table(random_key(&mut rng), pool[4..].to_vec());
        }
        if rng.gen_bool(0.3) {
            options = options.with_address_table(random_key(&mut rng), pool[8..].to_vec());
        }

        let message = compile(&instructions, Hash::new([7u8; 32]), &options).unwrap();
        assert_eq!(message.account_keys[0], signers[0]);
        assert!(message.header.num_required_signatures >= 1);

        let bytes = message.serialize().unwrap();
        assert_eq!(Message::deserialize(&bytes).unwrap(), message);

        let again = compile(&instructions, Hash::new([7u8; 32]), &options).unwrap();
        assert_eq!(again.serialize().unwrap(), bytes);
    }
}

#[test]
fn random_garbage_never_panics() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let len = rng.gen_range(0..300);
        let mut data = vec![0u8; len];
        rng.fill_bytes(&mut data);
        let _ = Transaction::deserialize(&data);
        let _ = Message::deserialize(&data);
    }
}

// -- fixed bytes ------------------------------------------------------------

#[test]
fn legacy_message_bytes_are_exact() {
    let ix = GenericInstruction::new(
        PublicKey::new([3; 32]),
        vec![
            AccountMeta::writable(PublicKey::new([1; 32]), true),
            AccountMeta::writable(PublicKey::new([2; 32]), false),
        ],
        vec![0x2a],
    );
    let message = compile(&[ix], Hash::new([9; 32]), &CompileOptions::default()).unwrap();

    // header, 3 keys, blockhash, then one instruction: program 2, accounts [0, 1], data [0x2a]
    let expected = format!(
        "01000103{}{}{}{}0102020001012a",
        "01".repeat(32),
        "02".repeat(32),
        "03".repeat(32),
        "09".repeat(32),
    );
    assert_eq!(hex::encode(message.serialize().unwrap()), expected);
}
