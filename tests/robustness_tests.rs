use std::ffi::OsString;
use std::io::Write;
use tempfile::tempdir;
use wiremock::MockServer;

mod common;

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_rows_are_skipped() {
    let server = MockServer::start().await;
    common::mount_provider(&server, 200, true, None).await;
    let dir = tempdir().unwrap();
    let (input, accounts) = common::cli_fixture(dir.path(), &[]);

    let mut file = std::fs::File::create(&input).unwrap();
    writeln!(file, "order_id,amount").unwrap();
    writeln!(file, ",10").unwrap();
    // Not a number
    writeln!(file, ",ten").unwrap();
    // Not a positive amount
    writeln!(file, ",-3").unwrap();
    // Not an order id
    writeln!(file, "order-42,5").unwrap();
    writeln!(file, ",20").unwrap();
    drop(file);

    let output = common::run_cli(vec![
        input.into(),
        "--accounts".into(),
        accounts.into(),
        "--provider-url".into(),
        server.uri().into(),
    ])
    .await;

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("skipping unreadable payment row").count(), 3);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 3);
    assert!(stdout.contains(",10,1,succeeded,"));
    assert!(stdout.contains(",20,1,succeeded,"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_accounts_file() {
    let dir = tempdir().unwrap();
    let (input, accounts) = common::cli_fixture(dir.path(), &["1"]);
    std::fs::write(
        &accounts,
        r#"[{"serviceName": "s", "accountName": "a", "parallelRequests": 0,
             "rateLimitPerSec": 1, "price": 1, "averageProcessingTime": 10}]"#,
    )
    .unwrap();

    let output = common::run_cli(vec![input.into(), "--accounts".into(), accounts.into()]).await;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("parallelRequests"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_accounts_file() {
    let dir = tempdir().unwrap();
    let (input, _accounts) = common::cli_fixture(dir.path(), &["1"]);
    let missing: OsString = dir.path().join("nope.json").into();

    let output = common::run_cli(vec![input.into(), "--accounts".into(), missing]).await;

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_provider_fails_payments_without_crashing() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    let dir = tempdir().unwrap();
    let (input, accounts) = common::cli_fixture(dir.path(), &["1", "2"]);

    let output = common::run_cli(vec![
        input.into(),
        "--accounts".into(),
        accounts.into(),
        "--provider-url".into(),
        format!("http://{address}").into(),
    ])
    .await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches(",1,failed,").count(), 2);
}
