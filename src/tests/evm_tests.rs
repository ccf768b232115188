//! EVM execution: gas padding, failure tags, rejection, JSON-RPC provider

#[cfg(test)]
mod evm_tests {
    use crate::config::EvmConfig;
    use crate::evm::{
        gas_with_margin, to_hex_quantity, EvmSigner, EvmTxBuilder, EvmTxError, EvmTxRequest,
        FailureTag, JsonRpcEvmSigner, ProviderError,
    };
    use crate::sender::{SendError, SwapStage, TxSender};
    use crate::test_utils::fixtures;
    use crate::test_utils::MockEvmSigner;
    use crate::types::TradeType;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";

    fn builder() -> EvmTxBuilder {
        EvmTxBuilder::new(&EvmConfig::default())
    }

    #[tokio::test]
    async fn test_send_pads_gas_and_forwards_native_value() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 1_000_000_000_000_000_000, 3_000_000_000);
        let signer = MockEvmSigner::succeeding(150_000, "0xabc");
        let responses = AtomicUsize::new(0);
        let on_response = |_: &crate::evm::EvmTxResponse| {
            responses.fetch_add(1, Ordering::SeqCst);
        };

        let mut stages = Vec::new();
        let hash = TxSender::default()
            .send_evm(&builder(), &signer, ACCOUNT, &trade, Some(&on_response), |stage, hash| {
                stages.push((stage, hash.to_string()))
            })
            .await
            .unwrap();

        assert_eq!(hash, "0xabc");
        assert_eq!(stages, vec![(SwapStage::Swap, "0xabc".to_string())]);
        assert_eq!(responses.load(Ordering::SeqCst), 1);

        let sent = signer.sent_requests();
        assert_eq!(sent.len(), 1);
        // 150k * 20% = 30k beats the 20k floor
        assert_eq!(sent[0].gas.as_deref(), Some(to_hex_quantity(180_000).as_str()));
        assert_eq!(sent[0].value, to_hex_quantity(1_000_000_000_000_000_000));
        assert_eq!(sent[0].to, trade.router_address());
        assert_eq!(sent[0].data, trade.encoded_swap_data());
    }

    #[tokio::test]
    async fn test_estimate_failure_is_tagged() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 100, 99);
        let signer = MockEvmSigner::failing_estimate(ProviderError::new(
            Some(-32000),
            "execution reverted: ERR_LIMIT_OUT",
        ));

        let err = builder()
            .send(ACCOUNT, &signer, trade.router_address(), trade.encoded_swap_data(), 0, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EvmTxError::EstimateFailed {
                tag: FailureTag::LimitOut,
                ..
            }
        ));
        assert!(err.to_string().contains("increasing max slippage"));
        assert!(signer.sent_requests().is_empty(), "nothing sent after a failed estimate");
    }

    #[tokio::test]
    async fn test_user_rejection_is_silent_rejected() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 100, 99);
        let signer = MockEvmSigner::failing_send(
            21_000,
            ProviderError::new(Some(4001), "MetaMask Tx Signature: User denied transaction signature."),
        );

        let mut stages = Vec::new();
        let err = TxSender::default()
            .send_evm(&builder(), &signer, ACCOUNT, &trade, None, |stage, _| stages.push(stage))
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::Rejected));
        assert!(stages.is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_keeps_tag() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 100, 99);
        let signer = MockEvmSigner::failing_send(
            21_000,
            ProviderError::new(Some(-32000), "execution reverted: Router: minTotalAmountOut"),
        );

        let err = TxSender::default()
            .send_evm(&builder(), &signer, ACCOUNT, &trade, None, |_, _| {})
            .await
            .unwrap_err();

        match err {
            SendError::Evm(e) => {
                assert_eq!(e.tag(), Some(FailureTag::MinTotalAmountOut));
                assert!(e.tag().unwrap().is_slippage());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // margin floor applies to small estimates
        assert_eq!(gas_with_margin(21_000, 2_000, 20_000), 41_000);
    }

    fn request() -> EvmTxRequest {
        EvmTxRequest {
            from: ACCOUNT.to_string(),
            to: "0x2222222222222222222222222222222222222222".to_string(),
            data: "0xdeadbeef".to_string(),
            value: "0x0".to_string(),
            gas: None,
        }
    }

    #[tokio::test]
    async fn test_json_rpc_signer_estimate_and_send() {
        let mut server = mockito::Server::new_async().await;
        let estimate = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_estimateGas" })))
            .with_header("content-type", "application/json")
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x5208" }).to_string())
            .create_async()
            .await;
        let send = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_sendTransaction" })))
            .with_header("content-type", "application/json")
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "0xfeed" }).to_string())
            .create_async()
            .await;

        let signer = JsonRpcEvmSigner::new(server.url()).unwrap();
        assert_eq!(signer.estimate_gas(&request()).await.unwrap(), 21_000);
        let response = signer.send_transaction(&request()).await.unwrap();
        assert_eq!(response.hash, "0xfeed");

        estimate.assert_async().await;
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_json_rpc_signer_surfaces_revert_data() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": 3, "message": "execution reverted", "data": "ERR_LIMIT_OUT" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let signer = JsonRpcEvmSigner::new(server.url()).unwrap();
        let err = signer.estimate_gas(&request()).await.unwrap_err();
        assert_eq!(err.code, Some(3));
        assert_eq!(FailureTag::classify(&err.message), FailureTag::LimitOut);
    }
}
