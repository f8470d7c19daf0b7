//! End-to-end swarm download tests.

mod common;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use swarmshare_core::swarm::{Candidate, DownloadStrategy, SwarmDownloader, SwarmOptions};
use swarmshare_core::tracker::TrackerClient;
use swarmshare_core::wire::Timeouts;
use swarmshare_core::Error;

use common::{
    create_temp_dir, create_test_file, dead_addr, random_bytes, start_peer, start_size_only_peer,
    start_stalling_peer, start_tracker, wire_path,
};

fn options(chunk_size: u64) -> SwarmOptions {
    SwarmOptions {
        chunk_size,
        max_parallel_chunks: 4,
        ..SwarmOptions::default()
    }
}

fn candidate(user_id: u64, addr: SocketAddr, path: String) -> Candidate {
    Candidate {
        user_id,
        addr,
        path,
    }
}

#[tokio::test]
async fn test_single_candidate_uses_one_connection() {
    let temp_dir = create_temp_dir();
    let content = random_bytes(200_000);
    let source = create_test_file(temp_dir.path(), "share/one.bin", &content);

    let (addr, stats) = start_peer().await;
    let downloader = SwarmDownloader::new(options(16 * 1024), temp_dir.path().join("dl"));
    let dest = temp_dir.path().join("dl/one.bin");

    let outcome = downloader
        .download("one.bin", &[candidate(1, addr, wire_path(&source))], &dest)
        .await
        .expect("download");

    assert_eq!(outcome.strategy, DownloadStrategy::Single { peer: addr });
    assert_eq!(outcome.size, content.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), content);
    assert_eq!(stats.connections(), 1);
    assert_eq!(stats.requests(), 1);
}

#[tokio::test]
async fn test_swarm_spreads_chunks_round_robin() {
    let temp_dir = create_temp_dir();
    let content = random_bytes(10 * 1024);

    let mut candidates = Vec::new();
    let mut all_stats = Vec::new();
    for id in 1..=3u64 {
        let source = create_test_file(temp_dir.path(), &format!("p{id}/ten.bin"), &content);
        let (addr, stats) = start_peer().await;
        candidates.push(candidate(id, addr, wire_path(&source)));
        all_stats.push(stats);
    }

    let downloader = SwarmDownloader::new(options(1024), temp_dir.path().join("dl"));
    let dest = temp_dir.path().join("dl/ten.bin");
    let outcome = downloader
        .download("ten.bin", &candidates, &dest)
        .await
        .expect("download");

    assert_eq!(
        outcome.strategy,
        DownloadStrategy::Swarm {
            chunks: 10,
            peers: 3
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), content);

    // Chunks 0,3,6,9 / 1,4,7 / 2,5,8, plus the size probe on the first peer.
    let requests: Vec<u64> = all_stats.iter().map(|s| s.requests()).collect();
    assert_eq!(requests, vec![5, 3, 3]);
}

#[tokio::test]
async fn test_failed_chunks_retry_on_next_candidate() {
    let temp_dir = create_temp_dir();
    let content = random_bytes(8 * 1024);
    let source = create_test_file(temp_dir.path(), "good/file.bin", &content);

    let liar = start_size_only_peer(content.len() as u64).await;
    let (good, _) = start_peer().await;
    let candidates = vec![
        candidate(1, liar, wire_path(&source)),
        candidate(2, dead_addr(), wire_path(&source)),
        candidate(3, good, wire_path(&source)),
    ];

    let downloader = SwarmDownloader::new(options(1024), temp_dir.path().join("dl"));
    let dest = temp_dir.path().join("dl/file.bin");
    let outcome = downloader
        .download("file.bin", &candidates, &dest)
        .await
        .expect("every chunk recovered from the good peer");

    assert_eq!(outcome.size, content.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), content);
}

#[tokio::test]
async fn test_short_copy_is_rejected_and_retried() {
    let temp_dir = create_temp_dir();
    let content = random_bytes(6 * 1024);
    let full = create_test_file(temp_dir.path(), "full/file.bin", &content);
    let short = create_test_file(temp_dir.path(), "short/file.bin", &content[..2048]);

    let (full_addr, _) = start_peer().await;
    let (short_addr, _) = start_peer().await;
    let candidates = vec![
        candidate(1, full_addr, wire_path(&full)),
        candidate(2, short_addr, wire_path(&short)),
    ];

    let downloader = SwarmDownloader::new(options(1024), temp_dir.path().join("dl"));
    let dest = temp_dir.path().join("dl/file.bin");
    downloader
        .download("file.bin", &candidates, &dest)
        .await
        .expect("download");

    assert_eq!(std::fs::read(&dest).unwrap(), content);
}

#[tokio::test]
async fn test_incomplete_download_writes_nothing() {
    let temp_dir = create_temp_dir();
    let liar = start_size_only_peer(4096).await;
    let candidates = vec![
        candidate(1, liar, "/nowhere/ghost.bin".to_string()),
        candidate(2, dead_addr(), "/nowhere/ghost.bin".to_string()),
    ];

    let downloader = SwarmDownloader::new(options(1024), temp_dir.path().join("dl"));
    let dest = temp_dir.path().join("dl/ghost.bin");
    let err = downloader
        .download("ghost.bin", &candidates, &dest)
        .await
        .unwrap_err();

    match err {
        Error::IncompleteDownload { file, missing } => {
            assert_eq!(file, "ghost.bin");
            assert_eq!(missing, vec![0, 1, 2, 3]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dest.exists());
    assert!(!temp_dir.path().join("dl/ghost.bin.part").exists());
}

#[tokio::test]
async fn test_swarm_zero_byte_file() {
    let temp_dir = create_temp_dir();
    let a = create_test_file(temp_dir.path(), "a/empty", b"");
    let b = create_test_file(temp_dir.path(), "b/empty", b"");
    let (addr_a, _) = start_peer().await;
    let (addr_b, stats_b) = start_peer().await;

    let downloader = SwarmDownloader::new(options(1024), temp_dir.path().join("dl"));
    let dest = temp_dir.path().join("dl/empty");
    let outcome = downloader
        .download(
            "empty",
            &[
                candidate(1, addr_a, wire_path(&a)),
                candidate(2, addr_b, wire_path(&b)),
            ],
            &dest,
        )
        .await
        .unwrap();

    assert_eq!(outcome.size, 0);
    assert_eq!(
        outcome.strategy,
        DownloadStrategy::Swarm {
            chunks: 0,
            peers: 2
        }
    );
    assert!(dest.is_file());
    assert_eq!(stats_b.connections(), 0);
}

/// Three peers share the same file through the tracker; a fourth fetches it.
#[tokio::test]
async fn test_fetch_through_tracker() {
    let shared = create_temp_dir();
    let downloads = create_temp_dir();
    let content = random_bytes(256 * 1024);
    let tracker_addr = start_tracker(shared.path()).await;
    let timeouts = Timeouts::default();

    let mut sessions = Vec::new();
    for name in ["alice", "bob", "carol"] {
        let (peer_addr, _) = start_peer().await;
        let mut tracker = TrackerClient::connect(tracker_addr, &timeouts).await.unwrap();
        tracker.register(name, "pw").await.unwrap();
        let session = tracker.login(name, "pw", peer_addr).await.unwrap();
        tracker.create_dir(session.user_id, "public").await.unwrap();

        let dir = shared.path().join(session.user_id.to_string()).join("public");
        create_test_file(&dir, "album.zip", &content);
        create_test_file(&dir, "other.txt", b"unrelated");
        sessions.push(tracker);
    }

    let (own_addr, own_stats) = start_peer().await;
    let mut tracker = TrackerClient::connect(tracker_addr, &timeouts).await.unwrap();
    tracker.register("dave", "pw").await.unwrap();
    let me = tracker.login("dave", "pw", own_addr).await.unwrap();

    let downloader = SwarmDownloader::new(options(32 * 1024), downloads.path().to_path_buf());
    let outcome = downloader
        .fetch(&mut tracker, me.user_id, "album.zip")
        .await
        .expect("fetch");

    assert_eq!(
        outcome.path,
        downloads
            .path()
            .join(me.user_id.to_string())
            .join("download")
            .join("album.zip")
    );
    assert_eq!(
        outcome.strategy,
        DownloadStrategy::Swarm {
            chunks: 8,
            peers: 3
        }
    );
    assert_eq!(std::fs::read(&outcome.path).unwrap(), content);
    assert_eq!(own_stats.connections(), 0);

    let err = downloader
        .fetch(&mut tracker, me.user_id, "nobody-has-this.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoCandidates(_)));

    drop(sessions);
}

#[tokio::test]
async fn test_stalled_peer_times_out_and_chunks_move_on() {
    let temp_dir = create_temp_dir();
    let content = random_bytes(4 * 1024);
    let source = create_test_file(temp_dir.path(), "good/slow.bin", &content);

    let stalled = start_stalling_peer().await;
    let (good, stats) = start_peer().await;
    let candidates = [
        candidate(1, stalled, "/stalled/slow.bin".to_string()),
        candidate(2, good, wire_path(&source)),
    ];

    let options = SwarmOptions {
        timeouts: Timeouts {
            connect: Duration::from_secs(2),
            io: Duration::from_millis(200),
        },
        ..options(1024)
    };
    let downloader = SwarmDownloader::new(options, temp_dir.path().join("dl"));
    let dest = temp_dir.path().join("dl/slow.bin");

    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        downloader.download("slow.bin", &candidates, &dest),
    )
    .await
    .expect("download must not hang on a stalled peer")
    .expect("download");

    assert_eq!(
        outcome.strategy,
        DownloadStrategy::Swarm {
            chunks: 4,
            peers: 2
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), content);
    // Size probe plus all four chunks ended up on the healthy peer.
    assert_eq!(stats.requests(), 5);
    assert!(started.elapsed() < Duration::from_secs(5));
}
