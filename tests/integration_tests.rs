//! End-to-end scenarios driven through the public API with in-memory fakes.

mod support;

use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use support::{chat, MemoryTelegram, ScriptedFfmpeg, Sent};
use tg_turbo::transfer::{self, TransferSettings};
use tg_turbo::upload::archive::plan_volumes;
use tg_turbo::upload::manifest::assign_tags;
use tg_turbo::upload::split::collect_parts;
use tg_turbo::upload::{reencode, run_pipeline, FileEntry, FileSet, KeepCorrupted, UploadOptions};
use tg_turbo::{
    CheckpointKey, CheckpointStore, ChatRef, MediaKind, OperationKind, RemoteMessage, UploadLimits,
};

const GB: u64 = 1024 * 1024 * 1024;

fn photo(id: i32) -> RemoteMessage {
    RemoteMessage::with_media(id, "", MediaKind::Photo)
}

#[tokio::test]
async fn download_resumes_after_checkpoint_and_is_idempotent() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    fs::write(&progress, r#"{"download_1001":500}"#).unwrap();

    let remote = MemoryTelegram::new(
        vec![chat(1001, "Lectures")],
        vec![photo(500), photo(501), photo(502)],
    );
    let settings = TransferSettings {
        item_delay: Duration::ZERO,
        downloads_dir: dir.path().join("downloads"),
        ..TransferSettings::default()
    };

    let mut store = CheckpointStore::load(&progress);
    let report = transfer::download_chat(&remote, &mut store, &settings, &ChatRef::Id(1001))
        .await
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(*remote.downloads.borrow(), vec![501, 502]);

    let key = CheckpointKey::new(OperationKind::DownloadChat, 1001, None);
    let reloaded = CheckpointStore::load(&progress);
    assert_eq!(reloaded.get(&key), 502);
    assert!(dir.path().join("downloads/Lectures/502-photo.jpg").exists());

    let mut store = reloaded;
    let again = transfer::download_chat(&remote, &mut store, &settings, &ChatRef::Id(1001))
        .await
        .unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(remote.downloads.borrow().len(), 2);
}

#[test]
fn archive_volumes_respect_the_ceiling() {
    let files = |sizes: &[u64]| -> Vec<FileEntry> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| FileEntry::new(format!("/r/f{}.pdf", i), format!("f{}.pdf", i), *size))
            .collect()
    };
    let ceiling = 2 * GB;

    let big = plan_volumes(&files(&[3 * GB / 2, 7 * GB / 10]), ceiling);
    assert_eq!(big.len(), 2);

    let small = plan_volumes(&files(&[GB / 2, GB / 2]), ceiling);
    assert_eq!(small.len(), 1);
    assert_eq!(small[0].len(), 2);
}

#[test]
fn tags_follow_natural_order_and_survive_new_files() {
    let set = |names: &[&str]| {
        FileSet::from_entries(
            names
                .iter()
                .map(|n| FileEntry::new(format!("/r/{}", n), *n, 1))
                .collect(),
        )
    };

    let before = assign_tags(&set(&["Lesson 10.mp4", "Lesson 2.mp4"]));
    assert_eq!(before["Lesson 2.mp4"], "F001");
    assert_eq!(before["Lesson 10.mp4"], "F002");

    let after = assign_tags(&set(&["Lesson 2.mp4", "Lesson 10.mp4", "Lesson 11.mp4"]));
    assert_eq!(after["Lesson 2.mp4"], before["Lesson 2.mp4"]);
    assert_eq!(after["Lesson 10.mp4"], before["Lesson 10.mp4"]);
    assert_eq!(after["Lesson 11.mp4"], "F003");
}

#[test]
fn split_parts_are_collected_in_numeric_order() {
    let dir = tempdir().unwrap();
    for name in [
        "talk_part010.mp4",
        "talk_part002.mp4",
        "talk_part001.mp4",
        "other_part001.mp4",
    ] {
        fs::write(dir.path().join(name), b"x").unwrap();
    }

    let parts = collect_parts(&dir.path().join("talk.mp4")).unwrap();
    let names: Vec<_> = parts
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["talk_part001.mp4", "talk_part002.mp4", "talk_part010.mp4"]
    );
}

#[tokio::test]
async fn conforming_video_is_never_transcoded() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("intro.mp4"), b"video").unwrap();
    let ffmpeg = ScriptedFfmpeg::default();

    let report = reencode::run(dir.path(), &ffmpeg, &KeepCorrupted)
        .await
        .unwrap();

    assert_eq!(report.conforming, 1);
    assert_eq!(report.converted, 0);
    assert!(ffmpeg.commands.borrow().is_empty());
    assert!(dir.path().join("intro.mp4").exists());
}

#[tokio::test]
async fn pipeline_reuses_recorded_chat_and_skips_uploaded_files() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("course");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(".processed_files"), "CHAT_ID:12345\n").unwrap();
    fs::write(root.join("Lesson 1.mp4"), b"video").unwrap();
    fs::write(root.join("notes.pdf"), b"notes").unwrap();

    let remote = MemoryTelegram::new(vec![chat(12345, "course")], Vec::new());
    let ffmpeg = ScriptedFfmpeg::default();
    let options = UploadOptions {
        root: root.clone(),
        destination: None,
        limits: UploadLimits::default(),
    };

    let first = run_pipeline(&remote, &ffmpeg, &KeepCorrupted, &options)
        .await
        .unwrap();
    assert_eq!(first.volumes, 1);
    assert_eq!(first.upload.sent, 2);
    assert!(!remote
        .log()
        .iter()
        .any(|s| matches!(s, Sent::Channel(_))));
    assert!(remote.files_sent().iter().all(|c| c.starts_with("📦 #F001") || c.starts_with("#F002")));

    let second = run_pipeline(&remote, &ffmpeg, &KeepCorrupted, &options)
        .await
        .unwrap();
    assert_eq!(second.upload.sent, 0);
    assert_eq!(second.upload.already_sent, 2);
    assert_eq!(remote.files_sent().len(), 2);

    let ledger = fs::read_to_string(root.join(".processed_files")).unwrap();
    assert_eq!(ledger.matches("CHAT_ID:").count(), 1);
}

#[tokio::test]
async fn later_runs_keep_sending_to_the_recorded_chat() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("course");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(".processed_files"), "CHAT_ID:12345\n").unwrap();
    fs::write(root.join("Lesson 1.mp4"), b"video").unwrap();

    let remote = MemoryTelegram::new(vec![chat(12345, "course"), chat(777, "other")], Vec::new());
    let ffmpeg = ScriptedFfmpeg::default();
    let mut options = UploadOptions {
        root: root.clone(),
        destination: Some(ChatRef::Id(777)),
        limits: UploadLimits::default(),
    };

    let first = run_pipeline(&remote, &ffmpeg, &KeepCorrupted, &options)
        .await
        .unwrap();
    options.destination = None;
    let second = run_pipeline(&remote, &ffmpeg, &KeepCorrupted, &options)
        .await
        .unwrap();

    assert_eq!(first.upload.sent, 1);
    assert_eq!(second.upload.sent, 0);
    let targets: Vec<i64> = remote
        .log()
        .into_iter()
        .filter_map(|s| match s {
            Sent::File(chat, _) => Some(chat),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![12345]);
}
