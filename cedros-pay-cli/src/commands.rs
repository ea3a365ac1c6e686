//! Command execution.
//!
//! Every command resolves to a JSON value that `main` prints on stdout, so
//! the binary composes with `jq` and friends.

use cedros_pay::networks::SolanaCluster;
use cedros_pay::proto::{PaymentRequirement, StripeSessionRequest};
use cedros_pay_http::constants::QUOTE_PATH;
use cedros_pay_http::{CancelSignal, ManagerBundle, PaymentReceipt};
use cedros_pay_svm::SolanaWallet;
use serde_json::{Value, json};

use crate::cli::{Cli, Command};
use crate::config::CliConfig;
use crate::error::CliError;
use crate::keypair::load_keypair;

/// Runs the parsed command line.
///
/// `cancel` aborts in-flight requests, e.g. on Ctrl-C.
///
/// # Errors
///
/// Returns configuration, keypair and payment errors.
pub async fn run(cli: Cli, cancel: &CancelSignal) -> Result<Value, CliError> {
    let config = CliConfig::load(&cli.config)?;
    let manager_config = config.manager_config(cli.server_url.as_deref())?;
    let bundle = ManagerBundle::build(&manager_config)?;

    match cli.command {
        Command::Health => {
            let prefix = bundle.routes.discover_prefix().await;
            Ok(json!({
                "serverUrl": bundle.routes.server_url(),
                "routePrefix": prefix,
                "quoteUrl": bundle.routes.build_url(QUOTE_PATH).await,
            }))
        }
        Command::Quote { resource, coupon } => {
            let quote = bundle
                .x402
                .request_quote(&resource, coupon.as_deref(), Some(cancel))
                .await?;
            Ok(describe_requirement(
                &quote.requirement,
                manager_config.solana_cluster,
            ))
        }
        Command::Pay {
            resource,
            coupon,
            keypair,
            gasless,
        } => {
            let path = keypair.or(config.keypair).ok_or(CliError::MissingKeypair)?;
            let mut wallet =
                SolanaWallet::with_rpc_url(load_keypair(&path)?, manager_config.rpc_url());
            if let Some(price) = config.compute_unit_price {
                wallet = wallet.with_compute_unit_price(price);
            }

            #[cfg(feature = "telemetry")]
            tracing::info!(payer = %wallet.pubkey(), resource = %resource, gasless, "paying");

            let receipt = if gasless {
                bundle
                    .x402
                    .process_gasless_payment(&resource, coupon.as_deref(), &wallet, Some(cancel))
                    .await?
            } else {
                bundle
                    .x402
                    .process_payment(&resource, coupon.as_deref(), &wallet, Some(cancel))
                    .await?
            };
            describe_receipt(&receipt)
        }
        Command::Checkout {
            resource,
            success_url,
            cancel_url,
            email,
            coupon,
        } => {
            let request = StripeSessionRequest {
                resource,
                success_url,
                cancel_url,
                metadata: None,
                customer_email: email,
                coupon_code: coupon,
            };
            let session = bundle.stripe.create_session(&request, Some(cancel)).await?;
            Ok(serde_json::to_value(session)?)
        }
    }
}

/// Summarises a quote, with a human-readable amount when decimals are known.
fn describe_requirement(requirement: &PaymentRequirement, cluster: SolanaCluster) -> Value {
    let known = cluster.known_asset(&requirement.asset);
    let decimals = requirement
        .extra
        .as_ref()
        .and_then(|extra| extra.decimals)
        .or_else(|| known.map(|asset| asset.decimals));
    let display = decimals
        .and_then(|d| requirement.display_amount(u32::from(d)))
        .map(|amount| amount.to_string());

    json!({
        "resource": requirement.resource,
        "network": requirement.network,
        "asset": requirement.asset,
        "symbol": known.map(|asset| asset.symbol),
        "amount": requirement.max_amount_required,
        "displayAmount": display,
        "payTo": requirement.pay_to,
        "memo": requirement.memo(),
        "expiresInSeconds": requirement.max_timeout_seconds,
    })
}

fn describe_receipt(receipt: &PaymentReceipt) -> Result<Value, CliError> {
    Ok(json!({
        "transactionId": receipt.transaction_id,
        "idempotencyKey": receipt.idempotency_key,
        "settlement": serde_json::to_value(&receipt.settlement)?,
        "body": receipt.body,
    }))
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use cedros_pay::ErrorCode;

    const NO_CONFIG: &str = "/nonexistent/cedros.toml";

    fn cli(server: &MockServer, args: &[&str]) -> Cli {
        let uri = server.uri();
        let mut argv = vec!["cedros-pay", "--config", NO_CONFIG, "--server-url", uri.as_str()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cedros-health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"routePrefix": "api/"})))
            .mount(&server)
            .await;

        let output = run(cli(&server, &["health"]), &CancelSignal::new())
            .await
            .unwrap();
        assert_eq!(output["routePrefix"], "/api");
        assert_eq!(
            output["quoteUrl"],
            format!("{}/api/paywall/v1/quote", server.uri())
        );
    }

    #[tokio::test]
    async fn test_quote_shows_display_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/paywall/v1/quote"))
            .and(body_partial_json(json!({"resource": "article-42", "couponCode": "SAVE10"})))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "crypto": {
                    "scheme": "exact",
                    "network": "solana",
                    "maxAmountRequired": "1500000",
                    "resource": "article-42",
                    "payTo": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
                    "asset": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                    "maxTimeoutSeconds": 300,
                    "extra": { "memo": "order-7" }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = run(
            cli(&server, &["quote", "article-42", "--coupon", "SAVE10"]),
            &CancelSignal::new(),
        )
        .await
        .unwrap();
        assert_eq!(output["symbol"], "USDC");
        assert_eq!(output["amount"], "1500000");
        assert_eq!(output["displayAmount"], "1.5");
        assert_eq!(output["memo"], "order-7");
        assert_eq!(output["expiresInSeconds"], 300);
    }

    #[tokio::test]
    async fn test_checkout_returns_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/paywall/v1/stripe-session"))
            .and(body_partial_json(json!({
                "resource": "article-42",
                "customerEmail": "buyer@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sessionId": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .mount(&server)
            .await;

        let output = run(
            cli(
                &server,
                &["checkout", "article-42", "--email", "buyer@example.com"],
            ),
            &CancelSignal::new(),
        )
        .await
        .unwrap();
        assert_eq!(output["sessionId"], "cs_test_1");
    }

    #[tokio::test]
    async fn test_pay_without_keypair() {
        let server = MockServer::start().await;
        let err = run(cli(&server, &["pay", "article-42"]), &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::MissingKeypair));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_domain_error_carries_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/paywall/v1/quote"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "resource_not_found", "message": "No such resource"}
            })))
            .mount(&server)
            .await;

        let err = run(cli(&server, &["quote", "missing"]), &CancelSignal::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.code(),
            Some(&ErrorCode::Other("resource_not_found".into()))
        );
    }

    #[tokio::test]
    async fn test_missing_server_url() {
        let cli = Cli::try_parse_from(["cedros-pay", "--config", NO_CONFIG, "health"]).unwrap();
        if cli.server_url.is_some() {
            // CEDROS_SERVER_URL is set in this environment.
            return;
        }
        let err = run(cli, &CancelSignal::new()).await.unwrap_err();
        assert!(matches!(err, CliError::MissingServerUrl));
    }
}
