#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end install / search / uninstall against a temporary project root.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    serde_json::{Value, json},
    skillshelf_config::StoreConfig,
    skillshelf_skills::{
        DiscoveryLinker, Error, FetchError, InstallOutcome, InstallRequest, SearchFilter, SkillManager,
        SkillSource, UninstallOutcome, UnlinkOutcome, ValidateTarget, link::CopyStrategy,
    },
};

const UNREACHABLE: &str = "http://127.0.0.1:9";

fn write_bundle(dir: &Path, name: &str, description: &str) -> PathBuf {
    let bundle = dir.join(name);
    fs::create_dir_all(bundle.join("scripts")).unwrap();
    fs::write(
        bundle.join("SKILL.md"),
        format!("---\nname: {name}\ndescription: {description}\n---\n\n# {name}\n"),
    )
    .unwrap();
    fs::write(bundle.join("scripts/run.sh"), "#!/bin/sh\necho ok\n").unwrap();
    bundle
}

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn remote_config(auto_sync: bool) -> Value {
    json!({
        "sources": [{
            "name": "test",
            "type": "github",
            "url": "https://github.com/acme/registry",
            "skills_path": "skills/skills-registry.json",
            "priority": 1
        }],
        "cache": {"enabled": true, "ttl_hours": 24},
        "auto_sync": {"enabled": auto_sync, "on_search": true, "on_list_all": true}
    })
}

/// Project root with a local catalog and a manager that links by copying.
fn project(root: &Path, api_base: &str, raw_base: &str, sync_enabled: bool) -> SkillManager {
    let mut config = StoreConfig::new(root);
    config.github.api_base = api_base.into();
    config.github.raw_base = raw_base.into();

    let sources = root.join("sources");
    let notes = write_bundle(&sources, "notes", "Personal note templates");
    write_json(
        &config.catalog_path(),
        &json!({
            "skills": {
                "notes": {
                    "name": "notes",
                    "description": "Personal note templates",
                    "source": {"type": "local", "path": notes},
                    "metadata": {"category": "documents", "tags": ["notes"]}
                }
            },
            "categories": {"documents": {"name": "Documents"}}
        }),
    );
    write_json(&config.remote_config_path(), &remote_config(sync_enabled));

    let linker = DiscoveryLinker::with_strategies(config.discovery_dir(), vec![Box::new(
        CopyStrategy,
    )]);
    let fetcher = Box::new(skillshelf_skills::DefaultFetcher::new(&config.github));
    SkillManager::with_components(config, fetcher, linker).unwrap()
}

/// Every path under `dir` with the bytes of each file, in walk order.
fn tree_snapshot(dir: &Path) -> Vec<(PathBuf, Option<Vec<u8>>)> {
    walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .map(|e| {
            let e = e.unwrap();
            let contents = e.file_type().is_file().then(|| fs::read(e.path()).unwrap());
            (e.path().strip_prefix(dir).unwrap().to_path_buf(), contents)
        })
        .collect()
}

fn skills_dir_entries(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root.join("skills"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn install_reinstall_and_uninstall_local_skill() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let mut manager = project(root, UNREACHABLE, UNREACHABLE, false);

    let InstallOutcome::Installed(installed) =
        manager.install(InstallRequest::catalog("notes")).await.unwrap()
    else {
        panic!("expected a fresh install");
    };
    assert!(installed.record.is_valid);
    assert_eq!(installed.record.install_path, PathBuf::from("skills/notes"));
    assert!(root.join("skills/notes/scripts/run.sh").is_file());
    assert!(root.join("plugin-skills/notes/SKILL.md").is_file());
    assert_eq!(skills_dir_entries(root), vec!["notes"]);
    assert!(
        manager
            .validate(ValidateTarget::Installed("notes".into()))
            .unwrap()
            .is_valid()
    );

    // A second install without force changes nothing on disk.
    let registry = manager.config().installed_path();
    let before = fs::read(&registry).unwrap();
    let tree_before = tree_snapshot(&root.join("skills"));
    let again = manager.install(InstallRequest::catalog("notes")).await.unwrap();
    assert!(matches!(again, InstallOutcome::AlreadyInstalled { .. }));
    assert_eq!(fs::read(&registry).unwrap(), before);
    assert_eq!(tree_snapshot(&root.join("skills")), tree_before);

    let removed = manager.uninstall("notes").await.unwrap();
    assert_eq!(removed, UninstallOutcome::Removed {
        path: root.join("skills/notes"),
        link: UnlinkOutcome::Removed,
        files_removed: true,
    });
    assert!(!root.join("skills/notes").exists());
    assert!(!root.join("plugin-skills/notes").exists());
    assert!(manager.installed().is_empty());

    assert_eq!(
        manager.uninstall("notes").await.unwrap(),
        UninstallOutcome::NotInstalled
    );
}

#[tokio::test]
async fn force_reinstall_replaces_files_and_source() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let mut manager = project(root, UNREACHABLE, UNREACHABLE, false);
    manager.install(InstallRequest::catalog("notes")).await.unwrap();
    fs::write(root.join("skills/notes/scratch.txt"), "left over").unwrap();

    let other = write_bundle(&root.join("elsewhere"), "notes", "Rewritten notes");
    fs::remove_dir_all(other.join("scripts")).unwrap();
    manager
        .install(InstallRequest::local("notes", &other).force(true))
        .await
        .unwrap();

    assert!(!root.join("skills/notes/scratch.txt").exists());
    assert!(!root.join("skills/notes/scripts").exists());
    assert_eq!(manager.installed()[0].source, SkillSource::local(&other));
    let info = manager.info("notes").unwrap();
    assert_eq!(info.header.unwrap().description.as_deref(), Some("Rewritten notes"));
    assert_eq!(skills_dir_entries(root), vec!["notes"]);
}

#[tokio::test]
async fn invalid_local_bundle_is_rejected_without_traces() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let mut manager = project(root, UNREACHABLE, UNREACHABLE, false);

    let broken = root.join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("README.md"), "no manifest here").unwrap();

    let err = manager
        .install(InstallRequest::local("broken", &broken))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ValidationFailed { .. }), "{err}");
    assert!(skills_dir_entries(root).is_empty());
    assert!(manager.installed().is_empty());

    let err = manager
        .install(InstallRequest::local("missing", root.join("nope")))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::Fetch {
                source: FetchError::SourceMissing { .. },
                ..
            }
        ),
        "{err}"
    );
    assert!(skills_dir_entries(root).is_empty());
}

#[tokio::test]
async fn search_without_sync_uses_local_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    let mut manager = project(tmp.path(), UNREACHABLE, UNREACHABLE, false);

    let all = manager.search("", &SearchFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(
        manager
            .search("spreadsheet", &SearchFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(manager.list_all(Some("documents")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn search_syncs_remote_catalog_and_installs_from_github() {
    let mut server = mockito::Server::new_async().await;
    let remote = json!({
        "skills": {
            "pdf": {
                "name": "pdf",
                "description": "Extract text from PDF files",
                "source": {"type": "github", "repo": "acme/skills", "path": "pdf"},
                "metadata": {"category": "documents", "tags": ["pdf"]}
            },
            "docx": {
                "name": "docx",
                "description": "Word documents",
                "source": {"type": "github", "repo": "acme/skills", "path": "docx"}
            }
        },
        "categories": {"office": {"name": "Office"}}
    });
    let catalog = server
        .mock("GET", "/repos/acme/registry/contents/skills/skills-registry.json")
        .with_status(200)
        .with_header("etag", "\"r1\"")
        .with_body(
            json!({"content": STANDARD.encode(remote.to_string()), "encoding": "base64"})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let listing = server
        .mock("GET", "/repos/acme/skills/contents/pdf")
        .with_status(200)
        .with_body(json!([{"name": "SKILL.md", "path": "pdf/SKILL.md", "type": "file"}]).to_string())
        .create_async()
        .await;
    let manifest = server
        .mock("GET", "/raw/acme/skills/v2/pdf/SKILL.md")
        .with_status(200)
        .with_body("---\nname: pdf\ndescription: Extract text from PDF files\n---\nUse it.\n")
        .create_async()
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let raw = format!("{}/raw", server.url());
    let mut manager = project(root, &server.url(), &raw, true);

    // Remote entries first, then the local-only one.
    let names: Vec<String> = manager
        .search("", &SearchFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["pdf", "docx", "notes"]);

    // The cache is fresh now; the remote is not asked again.
    let documents = SearchFilter {
        category: Some("documents".into()),
        ..SearchFilter::default()
    };
    assert_eq!(manager.search("", &documents).await.unwrap().len(), 2);
    let categories: Vec<String> = manager.catalog().unwrap().categories().keys().cloned().collect();
    assert_eq!(categories, vec!["office", "documents"]);
    catalog.assert_async().await;

    let outcome = manager
        .install(InstallRequest::catalog("pdf").branch("v2"))
        .await
        .unwrap();
    let InstallOutcome::Installed(installed) = outcome else {
        panic!("expected a fresh install");
    };
    assert_eq!(installed.record.source.to_string(), "github:acme/skills@v2:pdf");
    assert!(root.join("skills/pdf/SKILL.md").is_file());
    listing.assert_async().await;
    manifest.assert_async().await;
}
