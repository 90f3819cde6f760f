use docvault_core::config::CONFIG_FILE;
use docvault_core::{
    ChangeRole, CommitId, EntryDraft, LineageResolver, OperationKind, RepoLocks, RevertRequest,
    RevertScope, RevertSelector, RevertStatus, Vault, VaultConfig, VcsPrimitives,
};
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

fn upload(vault: &mut Vault, path: &str, content: &str) -> CommitId {
    write(vault.workdir(), path, content);
    let name = path.rsplit('/').next().unwrap();
    vault
        .record(
            EntryDraft::new(OperationKind::Add, path),
            &format!("Upload {name}"),
            None,
        )
        .unwrap()
        .commit
        .unwrap()
        .id
}

fn seeded_vault(dir: &TempDir) -> (Vault, CommitId) {
    let mut vault = Vault::init(dir.path()).unwrap();
    let root = upload(&mut vault, "README.md", "vault");
    (vault, root)
}

fn add_bare_remote(vault: &Vault) -> (TempDir, git2::Repository) {
    let dir = TempDir::new().unwrap();
    let bare = git2::Repository::init_bare(dir.path()).unwrap();
    git2::Repository::open(vault.workdir())
        .unwrap()
        .remote("origin", dir.path().to_str().unwrap())
        .unwrap();
    (dir, bare)
}

fn remote_tip(bare: &git2::Repository, branch: &str) -> String {
    bare.refname_to_id(&format!("refs/heads/{branch}"))
        .unwrap()
        .to_string()
}

#[test]
fn test_knowledge_update_is_linked_and_reverted_with_its_upload() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _) = seeded_vault(&dir);

    let k1 = upload(&mut vault, "raw/doc.md", "raw notes");
    write(vault.workdir(), "knowledge/doc.md", "generated summary");
    let k2 = vault
        .record(
            EntryDraft::new(OperationKind::Update, "knowledge/doc.md"),
            "Knowledge Base Update: doc.md",
            None,
        )
        .unwrap()
        .commit
        .unwrap()
        .id;

    let resolver = LineageResolver::new(vault.facade(), vault.ledger(), 50);
    assert_eq!(resolver.find_upload_commit("raw/doc.md").unwrap().id, k1);
    assert_eq!(
        resolver
            .find_derived_commit("doc.md", None, None, 50)
            .unwrap()
            .unwrap()
            .id,
        k2
    );

    let changes = vault.changes(10).unwrap();
    let derived = changes
        .iter()
        .find(|c| c.role == ChangeRole::DerivedGeneration && c.commit.id == k2)
        .unwrap();
    assert!(derived.heuristic_link);
    assert_eq!(derived.related_commit.as_ref(), Some(&k1));

    let request = RevertRequest::new(
        RevertSelector::Filename("raw/doc.md".into()),
        RevertScope::Both,
    );
    let plan = vault.plan_revert(&request).unwrap();
    assert_eq!(plan.derived.len(), 1);
    assert_eq!(plan.source.len(), 1);

    let result = vault.revert(request).unwrap();
    assert!(result.success);
    assert_eq!(result.status, RevertStatus::Reverted);
    assert!(result.changes_reverted[0].ends_with(":derived"));
    assert!(result.changes_reverted[1].ends_with(":source"));
    assert!(!vault.workdir().join("knowledge/doc.md").exists());
    assert!(!vault.workdir().join("raw/doc.md").exists());
    assert!(vault.workdir().join("README.md").exists());
}

#[test]
fn test_last_25_takes_the_reset_path() {
    let dir = TempDir::new().unwrap();
    let (mut vault, root) = seeded_vault(&dir);
    for i in 0..25 {
        upload(&mut vault, &format!("raw/doc{i}.md"), &format!("doc {i}"));
    }

    let request = RevertRequest::new(RevertSelector::LastN(25), RevertScope::Both);
    let result = vault.revert(request).unwrap();

    assert!(result.success);
    assert_eq!(result.status, RevertStatus::Reset);
    assert_eq!(vault.facade().head().unwrap(), Some(root));
    assert!(!vault.workdir().join("raw/doc0.md").exists());
    assert!(!vault.workdir().join("raw/doc24.md").exists());
    assert_eq!(
        fs::read_to_string(vault.workdir().join("README.md")).unwrap(),
        "vault"
    );

    // the ledger lives in the git directory and survives the reset
    let reopened = Vault::open(dir.path()).unwrap();
    assert_eq!(reopened.ledger().len(), 26);
}

#[test]
fn test_small_last_n_reverts_sequentially() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _) = seeded_vault(&dir);
    upload(&mut vault, "raw/a.md", "a");
    upload(&mut vault, "raw/b.md", "b");

    let result = vault
        .revert(RevertRequest::new(
            RevertSelector::LastN(2),
            RevertScope::SourceOnly,
        ))
        .unwrap();

    assert_eq!(result.status, RevertStatus::Reverted);
    assert_eq!(result.changes_reverted.len(), 2);
    assert_eq!(result.revert_commit_ids.len(), 3);
    assert!(!vault.workdir().join("raw/a.md").exists());
    assert!(!vault.workdir().join("raw/b.md").exists());
}

#[test]
fn test_revert_pushes_and_reset_force_pushes() {
    let dir = TempDir::new().unwrap();
    let (mut vault, root) = seeded_vault(&dir);
    upload(&mut vault, "raw/a.md", "a");
    upload(&mut vault, "raw/b.md", "b");

    let mut config = VaultConfig::default();
    config.revert.reset_threshold = 1;
    config.save(vault.metadata_dir().join(CONFIG_FILE)).unwrap();
    let (_remote_dir, bare) = add_bare_remote(&vault);
    let mut vault = Vault::open(dir.path()).unwrap();
    let branch = vault.facade().vcs().current_branch().unwrap().unwrap();

    let result = vault
        .revert(RevertRequest::new(
            RevertSelector::Filename("b.md".into()),
            RevertScope::SourceOnly,
        ))
        .unwrap();
    assert!(result.success);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    let head = vault.facade().head().unwrap().unwrap();
    assert_eq!(remote_tip(&bare, &branch), head.as_str());

    let result = vault
        .revert(RevertRequest::new(RevertSelector::LastN(2), RevertScope::Both))
        .unwrap();
    assert_eq!(result.status, RevertStatus::Reset);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(remote_tip(&bare, &branch), root.as_str());
}

#[test]
fn test_shared_locks_serialize_mutations() {
    let dir = TempDir::new().unwrap();
    let (vault, _) = seeded_vault(&dir);
    let locks = RepoLocks::new();
    let repo_id = vault.repo_id().to_string();
    drop(vault);

    let mut vault = Vault::open_with_locks(dir.path(), locks.clone()).unwrap();
    let lease = RepoLocks::acquire(&locks, &repo_id).unwrap();

    write(dir.path(), "raw/late.md", "late");
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let entry = vault
            .record(
                EntryDraft::new(OperationKind::Add, "raw/late.md"),
                "Upload late.md",
                None,
            )
            .unwrap();
        tx.send(entry.path).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    drop(lease);
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), "raw/late.md");
    worker.join().unwrap();
}
