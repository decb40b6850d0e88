//! End-to-end mission flow: tail, segment, converge, report.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use missiontail_core::config::Config;
use missiontail_core::convergence::{CounterFuture, CounterSource};
use missiontail_core::error::CounterError;
use missiontail_core::policy::EligibilityPolicy;
use missiontail_core::report::{Report, ReportSink};
use missiontail_core::watcher::MissionWatcher;

/// Counter that replays scripted values, repeating the last one.
struct Script(Mutex<Vec<i64>>);

impl CounterSource for Script {
    fn fetch(&self) -> CounterFuture<'_> {
        let mut values = self.0.lock().unwrap();
        let value = if values.len() > 1 { values.remove(0) } else { values[0] };
        Box::pin(async move { Ok::<_, CounterError>(value) })
    }
}

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<Report>>>);

impl ReportSink for Collect {
    fn report(&mut self, report: &Report) {
        self.0.lock().unwrap().push(report.clone());
    }
}

fn append(path: &Path, text: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

fn config(path: &Path) -> Config {
    let mut config = Config::default();
    config.general.log_path = path.to_path_buf();
    config.markers.event_pattern = Some("SpawnEnemy".to_string());
    config.policy = EligibilityPolicy::CountOrFallback {
        count_threshold: 15,
        fallback_duration_secs: 360.0,
    };
    config.validate().unwrap();
    config
}

fn mission_text() -> String {
    let mut text = String::from("1000.0 Script [Info]: GameRulesImpl::StartRound()\n");
    for i in 0..20 {
        text.push_str(&format!("{}.25 AI [Info]: SpawnEnemy CorpusEliteShieldDrone\n", 1001 + i));
    }
    text.push_str("1500.0 Game [Info]: CommitInventoryChangesToDB\n");
    text
}

#[tokio::test(start_paused = true)]
async fn completed_mission_reports_counter_delta() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("EE.log");
    append(&path, "1.0 Sys [Info]: Logged in Tenno (abc123)\n");

    let source = Script(Mutex::new(vec![50, 80]));
    let baseline = source.fetch().await.unwrap();
    assert_eq!(baseline, 50);

    let sink = Collect::default();
    let mut watcher = MissionWatcher::new(&config(&path), source, sink.clone(), baseline);
    watcher.prime().unwrap();

    let (tx, rx) = watch::channel(false);
    let reports = sink.0.clone();
    let driver = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        append(&path, &mission_text());
        for _ in 0..3600 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if reports
                .lock()
                .unwrap()
                .iter()
                .any(|r| matches!(r, Report::Increased { .. }))
            {
                break;
            }
        }
        tx.send(true).unwrap();
    };
    let (stats, ()) = tokio::join!(watcher.run(rx), driver);

    assert_eq!(stats.missions_completed, 1);
    assert_eq!(stats.counter_increases, 1);
    assert_eq!(watcher.baseline(), 80);

    let reports = sink.0.lock().unwrap().clone();
    assert_eq!(reports.len(), 2, "{reports:?}");
    assert!(matches!(reports[0], Report::Waiting { .. }));
    let Report::Increased { mission, delta, new_total } = &reports[1] else {
        panic!("expected an increase report, got {:?}", reports[1]);
    };
    assert_eq!(mission.event_count, Some(20));
    assert!(mission.event_count_known);
    assert_eq!((*delta, *new_total), (30, 80));

    let message = reports[1].message();
    assert!(message.contains("20 events"), "{message}");
    assert!(message.contains("rose by 30"), "{message}");
    assert!(message.contains("new total 80"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn repeated_end_marker_triggers_one_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("EE.log");
    std::fs::write(&path, "").unwrap();

    let sink = Collect::default();
    let source = Script(Mutex::new(vec![80]));
    let mut watcher = MissionWatcher::new(&config(&path), source, sink.clone(), 50);
    watcher.prime().unwrap();

    let (tx, rx) = watch::channel(false);
    let driver = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        append(&path, &mission_text());
        tokio::time::sleep(Duration::from_secs(400)).await;
        append(&path, "1500.0 Game [Info]: CommitInventoryChangesToDB\n");
        tokio::time::sleep(Duration::from_secs(400)).await;
        tx.send(true).unwrap();
    };
    let (stats, ()) = tokio::join!(watcher.run(rx), driver);

    assert_eq!(stats.missions_completed, 1);
    let increases = sink
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|r| matches!(r, Report::Increased { .. }))
        .count();
    assert_eq!(increases, 1);
}

#[tokio::test(start_paused = true)]
async fn rotation_resumes_from_start_of_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("EE.log");
    append(&path, &"9.0 filler line from the previous session\n".repeat(200));

    let sink = Collect::default();
    let source = Script(Mutex::new(vec![90]));
    let mut watcher = MissionWatcher::new(&config(&path), source, sink.clone(), 50);
    watcher.prime().unwrap();

    let (tx, rx) = watch::channel(false);
    let driver = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        std::fs::write(&path, mission_text()).unwrap();
        tokio::time::sleep(Duration::from_secs(400)).await;
        tx.send(true).unwrap();
    };
    let (stats, ()) = tokio::join!(watcher.run(rx), driver);

    assert_eq!(stats.counter_increases, 1);
    assert_eq!(watcher.baseline(), 90);
}
