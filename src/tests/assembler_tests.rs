//! Solana bundle assembly scenarios against the in-memory connection

#[cfg(test)]
mod assembler_tests {
    use crate::compat::{self, get_required_signers, get_static_account_keys};
    use crate::config::SolanaConfig;
    use crate::rpc::SolanaConnection;
    use crate::test_utils::fixtures::{self, usdc, SolanaFixture};
    use crate::test_utils::MockConnection;
    use crate::tx_builder::{
        AssemblyOutcome, AssemblyState, SolanaTxAssembler, TransactionBuilderError,
    };
    use crate::types::{wrapped_sol_mint, Currency};
    use solana_sdk::{
        message::AddressLookupTableAccount, pubkey::Pubkey, signature::Keypair,
        signer::Signer, transaction::VersionedTransaction,
    };
    use spl_associated_token_account::get_associated_token_address;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Arc;

    fn assembler(conn: &Arc<MockConnection>) -> SolanaTxAssembler {
        let conn: Arc<dyn SolanaConnection> = conn.clone();
        SolanaTxAssembler::new(conn, &SolanaConfig::default()).unwrap()
    }

    fn usdc_mint() -> Pubkey {
        Pubkey::from_str(fixtures::USDC_MINT).unwrap()
    }

    fn program_ids(tx: &VersionedTransaction) -> Vec<Pubkey> {
        let keys = tx.message.static_account_keys();
        tx.message
            .instructions()
            .iter()
            .map(|ix| keys[ix.program_id_index as usize])
            .collect()
    }

    fn built(outcome: AssemblyOutcome) -> Arc<crate::tx_builder::SolanaTxBundle> {
        match outcome {
            AssemblyOutcome::Built(bundle) => bundle,
            other => panic!("expected a built bundle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sol_input_wraps_only() {
        let user = Keypair::new().pubkey();
        let conn = Arc::new(MockConnection::new());
        conn.add_account(get_associated_token_address(&user, &usdc_mint()));

        let fx = fixtures::solana_trade(Currency::sol(), usdc(), user, 0);
        let bundle = built(assembler(&conn).assemble(&fx.trade).await.unwrap());

        let setup = bundle.setup_tx.as_ref().expect("wrap needs a setup transaction");
        // create WSOL ATA, transfer, sync_native; the system program id is all zeroes
        let programs = program_ids(setup);
        assert_eq!(
            programs,
            vec![spl_associated_token_account::id(), Pubkey::default(), spl_token::id()]
        );
        let open_orders_program = SolanaConfig::default().open_orders_program_id().unwrap();
        assert!(!programs.contains(&open_orders_program));

        let ixs = setup.message.instructions();
        assert_eq!(ixs[0].data, vec![1], "CreateIdempotent");
        assert_eq!(ixs[1].data[..4], [2, 0, 0, 0], "system Transfer");
        assert_eq!(ixs[2].data, vec![17], "SyncNative");
        assert_eq!(get_required_signers(&setup.message), &[user]);
        assert_eq!(compat::missing_signers(setup), vec![user]);

        assert!(bundle.clean_up_tx.is_none(), "token output needs no unwrap");
        assert_eq!(bundle.swap_tx.message.recent_blockhash(), &conn.blockhash());
        assert_eq!(setup.message.recent_blockhash(), &conn.blockhash());
    }

    #[tokio::test]
    async fn test_existing_wsol_account_is_not_recreated() {
        let user = Keypair::new().pubkey();
        let conn = Arc::new(MockConnection::new());
        conn.add_account(get_associated_token_address(&user, &usdc_mint()));
        conn.add_account(get_associated_token_address(&user, &wrapped_sol_mint()));

        let fx = fixtures::solana_trade(Currency::sol(), usdc(), user, 0);
        let bundle = built(assembler(&conn).assemble(&fx.trade).await.unwrap());

        // transfer + sync_native
        let setup = bundle.setup_tx.as_ref().unwrap();
        assert_eq!(setup.message.instructions().len(), 2);
    }

    #[tokio::test]
    async fn test_no_setup_when_everything_exists() {
        let user = Keypair::new().pubkey();
        let conn = Arc::new(MockConnection::new());
        conn.add_account(get_associated_token_address(&user, &usdc_mint()));
        conn.add_account(get_associated_token_address(&user, &wrapped_sol_mint()));

        let fx = fixtures::solana_trade(usdc(), Currency::sol(), user, 0);
        let bundle = built(assembler(&conn).assemble(&fx.trade).await.unwrap());

        assert!(bundle.setup_tx.is_none());
        let clean_up = bundle.clean_up_tx.as_ref().expect("SOL output is unwrapped");
        assert_eq!(clean_up.message.instructions().len(), 1);
        assert_eq!(bundle.transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_open_orders_created_and_substituted() {
        let user = Keypair::new().pubkey();
        let conn = Arc::new(MockConnection::new());
        conn.add_account(get_associated_token_address(&user, &usdc_mint()));
        conn.add_account(get_associated_token_address(&user, &wrapped_sol_mint()));

        let fx = fixtures::solana_trade(usdc(), Currency::sol(), user, 1);
        let (_, placeholder) = fx.markets[0];
        let bundle = built(assembler(&conn).assemble(&fx.trade).await.unwrap());

        let setup = bundle.setup_tx.as_ref().expect("open orders need a setup");
        // create_account + InitOpenOrders
        assert_eq!(setup.message.instructions().len(), 2);

        let signers = get_required_signers(&setup.message);
        assert_eq!(signers.len(), 2);
        assert_eq!(signers[0], user);
        let open_orders = signers[1];
        // the new account co-signed; only the user is still missing
        assert_eq!(compat::missing_signers(setup), vec![user]);

        let swap_keys = get_static_account_keys(&bundle.swap_tx.message);
        assert!(swap_keys.contains(&open_orders));
        assert!(!swap_keys.contains(&placeholder));
    }

    #[tokio::test]
    async fn test_existing_open_orders_reused() {
        let user = Keypair::new().pubkey();
        let conn = Arc::new(MockConnection::new());
        conn.add_account(get_associated_token_address(&user, &usdc_mint()));
        conn.add_account(get_associated_token_address(&user, &wrapped_sol_mint()));

        let fx = fixtures::solana_trade(usdc(), Currency::sol(), user, 2);
        let existing = Pubkey::new_unique();
        conn.add_open_orders(fx.markets[0].0, user, existing);

        let bundle = built(assembler(&conn).assemble(&fx.trade).await.unwrap());

        let setup = bundle.setup_tx.as_ref().unwrap();
        assert_eq!(setup.message.instructions().len(), 2, "only the second market is created");

        let swap_keys = get_static_account_keys(&bundle.swap_tx.message);
        assert!(swap_keys.contains(&existing));
        for (_, placeholder) in &fx.markets {
            assert!(!swap_keys.contains(placeholder));
        }
    }

    #[tokio::test]
    async fn test_swap_carries_program_state_signature() {
        let user = Keypair::new().pubkey();
        let conn = Arc::new(MockConnection::new());
        let fx = fixtures::solana_trade(Currency::sol(), usdc(), user, 0);
        let bundle = built(assembler(&conn).assemble(&fx.trade).await.unwrap());

        let swap = &bundle.swap_tx;
        assert_eq!(get_required_signers(&swap.message)[0], user, "user pays the swap fee");

        let position = compat::signer_position(&swap.message, &fx.program_state).unwrap();
        assert!(swap.signatures[position]
            .verify(fx.program_state.as_ref(), &swap.message.serialize()));
        assert_eq!(compat::missing_signers(swap), vec![user]);
    }

    #[tokio::test]
    async fn test_assembly_is_cached() {
        let conn = Arc::new(MockConnection::new());
        let assembler = assembler(&conn);
        let fx = fixtures::solana_trade(Currency::sol(), usdc(), Pubkey::new_unique(), 1);

        let first = built(assembler.assemble(&fx.trade).await.unwrap());
        let second = built(assembler.assemble(&fx.trade).await.unwrap());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(conn.blockhash_calls(), 1);
        assert!(Arc::ptr_eq(&fx.trade.solana_bundle().unwrap(), &first));
    }

    #[tokio::test]
    async fn test_concurrent_assembly_builds_once() {
        let (conn, gate, entered) = MockConnection::gated();
        let conn = Arc::new(conn);
        let assembler = assembler(&conn);
        let fx = fixtures::solana_trade(Currency::sol(), usdc(), Pubkey::new_unique(), 0);

        let (first, second) = tokio::join!(assembler.assemble(&fx.trade), async {
            // first call is parked inside the blockhash fetch
            entered.notified().await;
            let second = assembler.assemble(&fx.trade).await;
            gate.notify_one();
            second
        });

        assert!(matches!(first.unwrap(), AssemblyOutcome::Built(_)));
        assert!(matches!(second.unwrap(), AssemblyOutcome::InProgress));
        assert_eq!(conn.blockhash_calls(), 1);
    }

    #[tokio::test]
    async fn test_lookups_run_while_blockhash_pending() {
        let (conn, gate, entered) = MockConnection::gated();
        let conn = Arc::new(conn);
        let fx = fixtures::solana_trade(Currency::sol(), usdc(), Pubkey::new_unique(), 1);

        let table = Pubkey::new_unique();
        conn.add_lookup_table(AddressLookupTableAccount {
            key: table,
            addresses: vec![fx.pool],
        });
        let dyn_conn: Arc<dyn SolanaConnection> = conn.clone();
        let program = SolanaConfig::default().open_orders_program_id().unwrap();
        let assembler =
            SolanaTxAssembler::with_registry(dyn_conn, program, HashMap::from([(fx.pool, table)]));

        let (outcome, _) = tokio::join!(assembler.assemble(&fx.trade), async {
            entered.notified().await;
            tokio::task::yield_now().await;
            gate.notify_one();
        });
        assert!(matches!(outcome.unwrap(), AssemblyOutcome::Built(_)));

        let calls = conn.calls();
        let position = |call: &str| calls.iter().position(|c| *c == call).unwrap();
        let released = position("blockhash_end");
        assert!(position("blockhash_start") < released);
        for lookup in ["find_open_orders", "account_exists", "lookup_table"] {
            assert!(
                position(lookup) < released,
                "{} waited for the blockhash: {:?}",
                lookup,
                calls
            );
        }
    }

    #[tokio::test]
    async fn test_failure_is_retryable() {
        let conn = Arc::new(MockConnection::new());
        let assembler = assembler(&conn);
        let fx = fixtures::solana_trade(Currency::sol(), usdc(), Pubkey::new_unique(), 0);

        conn.set_fail_blockhash(true);
        let err = assembler.assemble(&fx.trade).await.unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Blockhash(_)));
        assert!(matches!(
            &*fx.trade.assembly_state().lock(),
            AssemblyState::Failed(_)
        ));
        assert!(fx.trade.solana_bundle().is_none());

        conn.set_fail_blockhash(false);
        assert!(matches!(
            assembler.assemble(&fx.trade).await.unwrap(),
            AssemblyOutcome::Built(_)
        ));
    }

    #[tokio::test]
    async fn test_skipped_without_recipient_or_context() {
        let conn = Arc::new(MockConnection::new());
        let assembler = assembler(&conn);

        let SolanaFixture { trade, .. } =
            fixtures::solana_trade(Currency::sol(), usdc(), Pubkey::default(), 0);
        assert!(matches!(
            assembler.assemble(&trade).await.unwrap(),
            AssemblyOutcome::Skipped
        ));

        let evm = fixtures::evm_trade(crate::types::TradeType::ExactIn, 100, 99);
        assert!(matches!(
            assembler.assemble(&evm).await.unwrap(),
            AssemblyOutcome::Skipped
        ));
        assert_eq!(conn.blockhash_calls(), 0);
    }

    #[tokio::test]
    async fn test_registered_lookup_table_compresses_swap() {
        let conn = Arc::new(MockConnection::new());
        let fx = fixtures::solana_trade(Currency::sol(), usdc(), Pubkey::new_unique(), 0);

        let table = Pubkey::new_unique();
        conn.add_lookup_table(AddressLookupTableAccount {
            key: table,
            addresses: vec![fx.pool],
        });
        let registry = HashMap::from([(fx.pool, table)]);
        let dyn_conn: Arc<dyn SolanaConnection> = conn.clone();
        let program = SolanaConfig::default().open_orders_program_id().unwrap();
        let assembler = SolanaTxAssembler::with_registry(dyn_conn, program, registry);

        let bundle = built(assembler.assemble(&fx.trade).await.unwrap());
        let message = &bundle.swap_tx.message;

        let lookups = message.address_table_lookups().unwrap_or_default();
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].account_key, table);
        assert!(!get_static_account_keys(message).contains(&fx.pool));
    }

    #[tokio::test]
    async fn test_corrupt_message_fails_decode() {
        let conn = Arc::new(MockConnection::new());
        let trade =
            fixtures::solana_trade_with_message(Currency::sol(), usdc(), Pubkey::new_unique(), "AAAA");
        let err = assembler(&conn).assemble(&trade).await.unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Decode(_)));
        assert!(!err.is_retryable());
    }
}
