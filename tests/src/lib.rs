#[cfg(test)]
mod tests {
    use attack_executor::decode_frame;
    use barrage::encoding::{read_results, write_results};
    use barrage::report::Summary;
    use barrage::{attack, AttackConfig, AttackJob, ErrorKind, Ordering, Protocol, RunMode};
    use env_logger::Env;
    use futures_util::StreamExt;
    use httpmock::prelude::*;
    use log::info;
    use more_asserts::assert_lt;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::fs::File;
    use std::io::{BufReader, BufWriter};
    use std::path::PathBuf;
    use std::sync::Once;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_util::codec::{Framed, LengthDelimitedCodec};

    static ONCE: Once = Once::new();
    fn init_logger() {
        ONCE.call_once(|| {
            let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
                .format_timestamp_millis()
                .try_init();
        });
    }

    pub fn resource_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/resources")
    }

    fn publish_targets(broker: &str) -> String {
        std::fs::read_to_string(resource_dir().join("publish-targets.txt"))
            .unwrap()
            .replace("{broker}", broker)
    }

    fn config(rate: u64, duration: Duration, ordering: Ordering) -> AttackConfig {
        let mut config = AttackConfig::new(rate, duration);
        config.ordering = ordering;
        config
    }

    /// Accept a single connection and collect `expected` frames, keyed by topic
    async fn frame_sink(expected: usize) -> (String, oneshot::Receiver<HashMap<String, usize>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let broker = listener.local_addr().unwrap().to_string();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut frames = Framed::new(stream, LengthDelimitedCodec::new());
            let mut per_topic = HashMap::new();
            let mut received = 0;
            while received < expected {
                let frame = match frames.next().await {
                    Some(Ok(frame)) => frame,
                    _ => break,
                };
                let (topic, _, _) = decode_frame(frame.freeze()).unwrap();
                *per_topic.entry(topic).or_insert(0) += 1;
                received += 1;
            }
            let _ = tx.send(per_topic);
        });
        (broker, rx)
    }

    #[rstest]
    #[case(Ordering::Sequential)]
    #[case(Ordering::Random)]
    #[tokio::test(flavor = "multi_thread")]
    async fn http_attack_hits_every_target_evenly(#[case] ordering: Ordering) {
        init_logger();
        let server = MockServer::start_async().await;
        let mut mocks = vec![];
        for path in ["/a", "/b", "/c"] {
            let mock = server
                .mock_async(|when, then| {
                    when.method(GET).path(path).header("authorization", "Bearer 123");
                    then.status(200).body("ok");
                })
                .await;
            mocks.push(mock);
        }
        let targets = ["/a", "/b", "/c"]
            .iter()
            .map(|p| format!("GET {}", server.url(*p)))
            .collect::<Vec<_>>()
            .join("\n");

        let results = attack(
            config(30, Duration::from_secs(1), ordering),
            &["Authorization: Bearer 123"],
            targets.as_bytes(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 30);
        assert!(results.iter().all(|o| o.is_success() && o.bytes_in == 2));
        assert!(results
            .outcomes()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        for mock in mocks {
            mock.assert_hits_async(10).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn publish_attack_delivers_every_message() {
        init_logger();
        let (broker, received) = frame_sink(30).await;
        let mut config = config(30, Duration::from_secs(1), Ordering::Sequential);
        config.protocol = Protocol::Publish;
        let results = attack(config, &[] as &[&str], publish_targets(&broker).as_bytes())
            .await
            .unwrap();
        assert_eq!(results.len(), 30);
        assert!(results.iter().all(|o| o.is_success() && o.bytes_in == 0));

        let per_topic = received.await.unwrap();
        info!("received: {:?}", &per_topic);
        assert_eq!(per_topic.get("orders"), Some(&20));
        assert_eq!(per_topic.get("audit"), Some(&10));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn publish_to_unreachable_broker() {
        init_logger();
        let broker = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let mut config = config(20, Duration::from_secs(1), Ordering::Random);
        config.protocol = Protocol::Publish;
        let results = attack(config, &[] as &[&str], publish_targets(&broker).as_bytes())
            .await
            .unwrap();
        assert_eq!(results.len(), 20);
        for outcome in results.iter() {
            let error = outcome.error.as_ref().unwrap();
            assert!(!error.message.is_empty());
            assert_eq!(outcome.bytes_in, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_cuts_slow_sends() {
        init_logger();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200).delay(Duration::from_secs(3));
            })
            .await;
        let mut config = config(10, Duration::from_secs(1), Ordering::Sequential);
        config.mode = RunMode::Deadline;
        let targets = format!("GET {}", server.url("/slow"));
        let started = std::time::Instant::now();
        let results = attack(config, &[] as &[&str], targets.as_bytes())
            .await
            .unwrap();
        assert_lt!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(results.planned(), 10);
        assert_lt!(results.len(), 10);
        assert!(!results.is_complete());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn results_file_round_trip_to_report() {
        init_logger();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/orders");
                then.status(201).body("created");
            })
            .await;
        let targets = format!("POST {}\nContent-Type: application/json", server.url("/orders"));
        let mut config = config(20, Duration::from_millis(500), Ordering::Sequential);
        config.seed = Some(7);
        let job = AttackJob::new(config, &[] as &[&str]).unwrap();
        let path = std::env::temp_dir().join(format!("barrage-{}.jsonl", job.job_id()));
        let results = job.run(targets.as_bytes()).await.unwrap();

        write_results(BufWriter::new(File::create(&path).unwrap()), &results).unwrap();
        let outcomes = read_results(BufReader::new(File::open(&path).unwrap())).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(outcomes, results.outcomes());

        let summary = Summary::new(&outcomes);
        assert_eq!(summary.requests, 10);
        assert_eq!(summary.success, 10);
        assert_eq!(summary.bytes_in, 70);
        assert!(summary.errors.is_empty());
        assert!(summary.to_string().contains("100.00%"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refused_http_targets_are_reported() {
        init_logger();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let targets = format!("GET http://127.0.0.1:{}/", port);
        let results = attack(
            config(10, Duration::from_secs(1), Ordering::Sequential),
            &[] as &[&str],
            targets.as_bytes(),
        )
        .await
        .unwrap();
        let summary = Summary::new(results.outcomes());
        assert_eq!(summary.requests, 10);
        assert_eq!(summary.success, 0);
        assert_eq!(summary.errors.get(&ErrorKind::ConnectionRefused), Some(&10));
    }
}
