//! Archive Integration Tests
//!
//! End-to-end runs against the in-memory API: tree, assets, link
//! rewriting and the delivered `.tgz`.

mod common;

use std::path::Path;

use bookstack_export::config::{ConfigFile, ResolvedConfig};
use bookstack_export::core::Orchestrator;
use common::{api, listing, read_archive, single_chain, MockApi, HOST};
use serde_json::json;
use tempfile::TempDir;

const TIMESTAMP: &str = "2024-05-01_10-00-00";
const BASE: &str = "bookstack_export_2024-05-01_10-00-00";
const PAGE_DIR: &str = "bookstack_export_2024-05-01_10-00-00/engineering/handbook/onboarding";

fn config(assets_yaml: &str, output: &Path) -> ResolvedConfig {
    let yaml = format!(
        "host: {}\ncredentials:\n  token_id: id\n  token_secret: secret\nformats: [markdown]\n{}",
        HOST, assets_yaml
    );
    let file: ConfigFile = serde_yaml::from_str(&yaml).unwrap();
    ResolvedConfig::resolve(file, Some(output), |_| None).unwrap()
}

fn image_url(name: &str) -> String {
    format!("{}/uploads/images/gallery/2024-05/{}", HOST, name)
}

/// `single_chain` plus two images (one broken) and two attachments (one external)
fn wiki_with_assets() -> MockApi {
    let diagram = image_url("diagram.png");
    let broken = image_url("broken.png");
    let page = format!(
        "# First Day\n\n![diagram.png]({d})\n![broken.png]({b})\n[notes.txt]({h}/attachments/9)\n",
        d = diagram,
        b = broken,
        h = HOST
    );

    single_chain()
        .with_bytes(api("pages/30/export/markdown"), page.as_bytes())
        .with_json(
            api("image-gallery"),
            json!({"data": [
                {"id": 7, "uploaded_to": 30, "url": diagram, "name": "diagram.png"},
                {"id": 8, "uploaded_to": 30, "url": broken, "name": "broken.png"}
            ]}),
        )
        .with_bytes(diagram.clone(), b"PNG-DATA")
        .failing(broken.clone())
        .with_json(
            api("image-gallery/7"),
            json!({"id": 7, "content": {"markdown": format!("![diagram.png]({})", diagram)}}),
        )
        .with_json(
            api("image-gallery/8"),
            json!({"id": 8, "content": {"markdown": format!("![broken.png]({})", broken)}}),
        )
        .with_json(
            api("attachments"),
            json!({"data": [
                {"id": 9, "uploaded_to": 30, "name": "notes.txt", "external": false},
                {"id": 11, "uploaded_to": 30, "name": "Vendor docs", "external": true}
            ]}),
        )
        .with_json(
            api("attachments/9"),
            json!({
                "id": 9,
                "content": "aGVsbG8=",
                "links": {"markdown": format!("[notes.txt]({}/attachments/9)", HOST)}
            }),
        )
}

#[tokio::test]
async fn test_single_chain_markdown_with_meta() {
    let temp = TempDir::new().unwrap();
    let config = config("assets:\n  export_meta: true\n", temp.path());
    let api = single_chain();

    let summary = Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap();

    let archive = temp.path().join(format!("{}.tgz", BASE));
    assert_eq!(summary.archive_path.as_deref(), Some(archive.as_path()));
    assert_eq!(summary.page_count, 1);
    assert!(!temp.path().join(format!("{}.tar", BASE)).exists());

    let entries = read_archive(&archive);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            format!("{}/first-day.md", PAGE_DIR),
            format!("{}/first-day_meta.json", PAGE_DIR),
        ]
    );
    assert_eq!(summary.entry_count, 2);
    assert_eq!(entries[0].1, b"# First Day\n".to_vec());

    let meta: serde_json::Value = serde_json::from_slice(&entries[1].1).unwrap();
    assert_eq!(meta["slug"], "first-day");
    assert!(String::from_utf8_lossy(&entries[1].1).contains("\n    \"book_id\": 10"));
}

#[tokio::test]
async fn test_meta_skipped_when_disabled() {
    let temp = TempDir::new().unwrap();
    let config = config("", temp.path());
    let api = single_chain();

    let summary = Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap();

    let entries = read_archive(summary.archive_path.as_deref().unwrap());
    assert_eq!(entries.len(), 1);
    assert!(entries[0].0.ends_with("first-day.md"));
}

#[tokio::test]
async fn test_assets_archived_and_links_rewritten() {
    let temp = TempDir::new().unwrap();
    let config = config(
        "assets:\n  export_images: true\n  export_attachments: true\n  modify_markdown: true\n",
        temp.path(),
    );
    let api = wiki_with_assets();

    let summary = Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap();
    let entries = read_archive(summary.archive_path.as_deref().unwrap());
    let find = |name: &str| {
        entries
            .iter()
            .find(|(n, _)| n == &format!("{}/{}", PAGE_DIR, name))
            .map(|(_, d)| d.clone())
    };

    assert_eq!(find("images/first-day/diagram.png"), Some(b"PNG-DATA".to_vec()));
    assert_eq!(find("attachments/first-day/notes.txt"), Some(b"hello".to_vec()));
    assert_eq!(find("images/first-day/broken.png"), None);
    assert_eq!(entries.len(), 3);

    let page = String::from_utf8(find("first-day.md").unwrap()).unwrap();
    assert!(page.contains("![diagram.png](images/first-day/diagram.png)"));
    assert!(page.contains("[notes.txt](attachments/first-day/notes.txt)"));
    // Failed download keeps its original link
    assert!(page.contains(&format!("![broken.png]({})", image_url("broken.png"))));
}

#[tokio::test]
async fn test_failed_and_external_assets_never_looked_up() {
    let temp = TempDir::new().unwrap();
    let config = config(
        "assets:\n  export_images: true\n  export_attachments: true\n  modify_markdown: true\n",
        temp.path(),
    );
    let api = wiki_with_assets();

    Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap();

    let calls = api.calls();
    assert!(!calls.contains(&common::api("image-gallery/8")));
    assert!(!calls.contains(&common::api("attachments/11")));
}

#[tokio::test]
async fn test_links_untouched_without_modify_markdown() {
    let temp = TempDir::new().unwrap();
    let config = config("assets:\n  export_images: true\n", temp.path());
    let api = wiki_with_assets();

    let summary = Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap();
    let entries = read_archive(summary.archive_path.as_deref().unwrap());
    let page = entries
        .iter()
        .find(|(n, _)| n.ends_with("first-day.md"))
        .map(|(_, d)| String::from_utf8(d.clone()).unwrap())
        .unwrap();

    assert!(page.contains(&format!("![diagram.png]({})", image_url("diagram.png"))));
    // Attachments were not requested
    assert!(!entries.iter().any(|(n, _)| n.contains("/attachments/")));
}

#[tokio::test]
async fn test_empty_instance_produces_no_archive() {
    let temp = TempDir::new().unwrap();
    let config = config("", temp.path());
    let api = MockApi::new()
        .with_json(api("shelves"), listing(&[]))
        .with_json(api("books"), listing(&[]))
        .with_json(api("chapters"), listing(&[]));

    let summary = Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap();

    assert!(summary.archive_path.is_none());
    assert_eq!(summary.page_count, 0);
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_page_export_failure_aborts_run() {
    let temp = TempDir::new().unwrap();
    let config = config("", temp.path());
    let api = single_chain().failing(api("pages/30/export/markdown"));

    let err = Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("HTTP status 500"));
    assert!(!temp.path().join(format!("{}.tgz", BASE)).exists());
}

#[tokio::test]
async fn test_same_named_attachments_both_archived() {
    let temp = TempDir::new().unwrap();
    let config = config(
        "assets:\n  export_attachments: true\n  modify_markdown: true\n",
        temp.path(),
    );
    let page = format!(
        "# First Day\n\n[report.pdf]({h}/attachments/9)\n[report.pdf]({h}/attachments/12)\n",
        h = HOST
    );
    let detail = |id: u64, content: &str| {
        json!({
            "id": id,
            "content": content,
            "links": {"markdown": format!("[report.pdf]({}/attachments/{})", HOST, id)}
        })
    };
    let api = single_chain()
        .with_bytes(api("pages/30/export/markdown"), page.as_bytes())
        .with_json(
            api("attachments"),
            json!({"data": [
                {"id": 9, "uploaded_to": 30, "name": "report.pdf", "external": false},
                {"id": 12, "uploaded_to": 30, "name": "report.pdf", "external": false}
            ]}),
        )
        .with_json(api("attachments/9"), detail(9, "Zmlyc3Q="))
        .with_json(api("attachments/12"), detail(12, "c2Vjb25k"));

    let summary = Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap();
    let entries = read_archive(summary.archive_path.as_deref().unwrap());
    let find = |name: &str| {
        entries
            .iter()
            .find(|(n, _)| n == &format!("{}/{}", PAGE_DIR, name))
            .map(|(_, d)| d.clone())
    };

    assert_eq!(find("attachments/first-day/report.pdf"), Some(b"first".to_vec()));
    assert_eq!(find("attachments/first-day/12_report.pdf"), Some(b"second".to_vec()));
    assert_eq!(entries.len(), 3);

    let page = String::from_utf8(find("first-day.md").unwrap()).unwrap();
    assert!(page.contains("[report.pdf](attachments/first-day/report.pdf)\n"));
    assert!(page.contains("[report.pdf](attachments/first-day/12_report.pdf)\n"));
}

#[tokio::test]
async fn test_image_detail_failure_keeps_link_and_file() {
    let temp = TempDir::new().unwrap();
    let config = config(
        "assets:\n  export_images: true\n  export_attachments: true\n  modify_markdown: true\n",
        temp.path(),
    );
    let api = wiki_with_assets().failing(api("image-gallery/7"));

    let summary = Orchestrator::new(&config, &api, None)
        .run_at(TIMESTAMP)
        .await
        .unwrap();
    let entries = read_archive(summary.archive_path.as_deref().unwrap());
    let find = |name: &str| {
        entries
            .iter()
            .find(|(n, _)| n == &format!("{}/{}", PAGE_DIR, name))
            .map(|(_, d)| d.clone())
    };

    assert_eq!(find("images/first-day/diagram.png"), Some(b"PNG-DATA".to_vec()));
    assert!(api.calls().contains(&common::api("image-gallery/7")));

    let page = String::from_utf8(find("first-day.md").unwrap()).unwrap();
    assert!(page.contains(&format!("![diagram.png]({})", image_url("diagram.png"))));
    assert!(page.contains("[notes.txt](attachments/first-day/notes.txt)"));
}
