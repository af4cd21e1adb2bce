//! end-to-end scenarios exercising the public surface the way the CLI does

use std::fs;

use tempfile::tempdir;

use mingit::ops::{self, CommitOutcome, MergeOptions, MergeOutcome};
use mingit::transport;
use mingit::{graph, object_digest, refs, revision, Error, Object, ObjectId, Repository};

fn write_file(repo: &Repository, name: &str, content: &[u8]) {
    fs::write(repo.work_dir().join(name), content).unwrap();
}

fn add_commit(repo: &Repository, name: &str, content: &[u8], msg: &str) -> ObjectId {
    write_file(repo, name, content);
    ops::add_path(repo, name, false).unwrap();
    match ops::commit(repo, Some(msg)).unwrap() {
        CommitOutcome::Created(id) => id,
        CommitOutcome::NothingToCommit => panic!("expected commit for {msg}"),
    }
}

#[test]
fn scenario_linear_commits() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    let c1 = add_commit(&repo, "a.txt", b"A\n", "c1");
    let c2 = add_commit(&repo, "a.txt", b"B\n", "c2");

    // HEAD is attached to main
    assert_eq!(
        refs::read_head(&repo).unwrap(),
        refs::HeadState::Symbolic("refs/heads/main".into())
    );
    assert_eq!(ops::rev_list(&repo, None, false, None).unwrap(), vec![c2, c1]);

    // HEAD:a.txt == "B\n"
    let head_tree = graph::load_commit(&repo, &c2).unwrap().tree;
    assert_eq!(
        mingit::worktree::read_blob_from_tree(&repo, &head_tree, "a.txt").unwrap(),
        Some(b"B\n".to_vec())
    );

    // log -n1 --oneline
    let entries = ops::log(&repo, None, Some(1)).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, c2);
    assert_eq!(entries[0].commit.subject(), "c2");
    assert_eq!(entries[0].id.short().len(), 7);
}

#[test]
fn scenario_branch_and_fast_forward() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    add_commit(&repo, "a.txt", b"A\n", "c1");
    ops::checkout(&repo, "feature", true, false).unwrap();
    let c3 = add_commit(&repo, "b.txt", b"X\n", "c3");

    ops::checkout(&repo, "main", false, false).unwrap();
    let outcome = ops::merge(&repo, "feature", &MergeOptions::default()).unwrap();
    assert!(matches!(outcome, MergeOutcome::FastForward { to, .. } if to == c3));

    assert_eq!(refs::resolve(&repo, "refs/heads/main").unwrap(), Some(c3));
    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"A\n");
    assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"X\n");
}

#[test]
fn scenario_three_way_conflict() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    let c1 = add_commit(&repo, "a.txt", b"A\n", "c1");
    ops::checkout(&repo, "feature", true, false).unwrap();
    let c3 = add_commit(&repo, "a.txt", b"A1\n", "c3");
    ops::checkout(&repo, "main", false, false).unwrap();
    let c4 = add_commit(&repo, "a.txt", b"A2\n", "c4");

    let err = ops::merge(&repo, "feature", &MergeOptions::default());
    assert!(matches!(err, Err(Error::MergeConflict(_))));

    assert_eq!(
        fs::read(dir.path().join("a.txt")).unwrap(),
        b"<<<<<<< HEAD\nA2\n=======\nA1\n>>>>>>> feature\n"
    );
    assert_eq!(ops::commit::merge_head(&repo), Some(c3));
    // main unchanged
    assert_eq!(
        ops::rev_list(&repo, Some("main"), false, None).unwrap(),
        vec![c4, c1]
    );
}

#[test]
fn scenario_annotated_tag_roundtrip() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let head = add_commit(&repo, "a.txt", b"A\n", "c1");

    let tag_id = ops::tag::create_annotated(&repo, "v2", None, "release v2", false).unwrap();
    assert_eq!(refs::resolve(&repo, "refs/tags/v2").unwrap(), Some(tag_id));

    let loaded = repo.odb().load(&tag_id).unwrap();
    assert_eq!(loaded.kind(), mingit::Kind::Tag);
    assert_eq!(revision::rev_parse(&repo, "v2^{}").unwrap(), head);
    // raw bytes re-hash to the tag id
    assert_eq!(loaded.id(), tag_id);
}

#[test]
fn scenario_clone_local() {
    let src_dir = tempdir().unwrap();
    let src = Repository::init(src_dir.path()).unwrap();
    let c1 = add_commit(&src, "a.txt", b"A\n", "c1");
    let c2 = add_commit(&src, "a.txt", b"B\n", "c2");

    let dst_dir = tempdir().unwrap();
    let dest = dst_dir.path().join("dest");
    let cloned = transport::clone(src_dir.path().to_str().unwrap(), &dest).unwrap();

    assert!(cloned.odb().exists(&c1));
    assert!(cloned.odb().exists(&c2));
    assert_eq!(refs::resolve(&cloned, "refs/heads/main").unwrap(), Some(c2));
    assert_eq!(
        refs::resolve(&cloned, "refs/remotes/origin/main").unwrap(),
        Some(c2)
    );
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"B\n");
}

#[test]
fn scenario_pack_with_ref_delta() {
    // a pack holding "hello\n" as a REF-delta against a loose "hell\n"
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    let base_id = repo
        .odb()
        .store(&Object::Blob(mingit::Blob::new(b"hell\n".to_vec())))
        .unwrap();
    let target_id = object_digest("blob", b"hello\n");

    // delta: copy 4 bytes from offset 0, insert "o\n"
    let mut delta = vec![0x05, 0x06];
    delta.extend_from_slice(&[0x90, 0x04]);
    delta.extend_from_slice(&[0x02, b'o', b'\n']);

    let mut pack = Vec::new();
    pack.extend_from_slice(b"PACK");
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&1u32.to_be_bytes());
    // entry header: type 7 (ref-delta), size = delta len
    pack.push((7 << 4) | (delta.len() as u8));
    pack.extend_from_slice(base_id.as_bytes());
    {
        use std::io::Write;
        let mut encoder =
            flate2_encoder();
        encoder.write_all(&delta).unwrap();
        pack.extend_from_slice(&encoder.finish().unwrap());
    }
    let trailer = mingit::sha1_digest(&pack);
    pack.extend_from_slice(trailer.as_bytes());

    let indexed = repo.odb().ingest_pack(pack).unwrap();
    assert_eq!(indexed, 1);

    let (kind, content) = repo.odb().load_content(&target_id).unwrap();
    assert_eq!(kind, mingit::Kind::Blob);
    assert_eq!(content, b"hello\n");

    // prefix resolution sees the packed object
    let prefix = &target_id.to_hex()[..6];
    assert_eq!(repo.odb().resolve_prefix(prefix).unwrap(), target_id);
}

fn flate2_encoder() -> flate2::write::ZlibEncoder<Vec<u8>> {
    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast())
}

#[test]
fn fetch_is_idempotent() {
    let src_dir = tempdir().unwrap();
    let src = Repository::init(src_dir.path()).unwrap();
    add_commit(&src, "a.txt", b"A\n", "c1");

    let dst_dir = tempdir().unwrap();
    let dst = Repository::init(dst_dir.path()).unwrap();
    let mut config = dst.load_config().unwrap();
    config
        .add_remote("origin", src_dir.path().to_str().unwrap())
        .unwrap();
    dst.save_config(&config).unwrap();

    let first = transport::fetch(&dst, "origin", &[]).unwrap();
    assert!(first.objects_received > 0);
    let second = transport::fetch(&dst, "origin", &[]).unwrap();
    assert_eq!(second.objects_received, 0);
}

#[test]
fn ref_cas_races_settle_one_winner() {
    // two sequential CAS updates from the same observed value: exactly one
    // succeeds (the lock + verify makes the loser observe the new value)
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let c1 = add_commit(&repo, "a.txt", b"A\n", "c1");

    let x = ObjectId::from_bytes([0xaa; 20]);
    let y = ObjectId::from_bytes([0xbb; 20]);
    let first = refs::update_ref(&repo, "refs/heads/race", &c1, None, "seed");
    assert!(first.is_ok());

    let win = refs::update_ref(&repo, "refs/heads/race", &x, Some(&c1), "winner");
    let lose = refs::update_ref(&repo, "refs/heads/race", &y, Some(&c1), "loser");
    assert!(win.is_ok());
    assert!(matches!(lose, Err(Error::RefUpdateRejected { .. })));
    assert_eq!(refs::resolve(&repo, "refs/heads/race").unwrap(), Some(x));
}

#[test]
fn merge_base_is_symmetric() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    add_commit(&repo, "a.txt", b"A\n", "base");
    let base = refs::head_id(&repo).unwrap().unwrap();
    ops::checkout(&repo, "left", true, false).unwrap();
    let left = add_commit(&repo, "l.txt", b"L\n", "left");
    ops::checkout(&repo, "main", false, false).unwrap();
    let right = add_commit(&repo, "r.txt", b"R\n", "right");

    assert_eq!(graph::merge_base(&repo, &left, &right).unwrap(), Some(base));
    assert_eq!(graph::merge_base(&repo, &right, &left).unwrap(), Some(base));
    assert!(graph::is_ancestor(&repo, &base, &left).unwrap());
    assert_eq!(graph::merge_base(&repo, &base, &left).unwrap(), Some(base));
}

#[test]
fn head_precedence_over_tags_in_rev_parse() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let c1 = add_commit(&repo, "a.txt", b"A\n", "c1");
    let c2 = add_commit(&repo, "a.txt", b"B\n", "c2");

    // tag "x" at c1 and branch "x" at c2: the branch wins
    refs::update_ref(&repo, "refs/tags/x", &c1, None, "tag").unwrap();
    refs::update_ref(&repo, "refs/heads/x", &c2, None, "branch").unwrap();
    assert_eq!(revision::rev_parse(&repo, "x").unwrap(), c2);
}

#[test]
fn index_roundtrip_property() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    for name in ["a.txt", "z.txt", "dir/mid.txt"] {
        fs::create_dir_all(repo.work_dir().join(name).parent().unwrap()).unwrap();
        write_file(&repo, name, name.as_bytes());
        ops::add_path(&repo, name, false).unwrap();
    }

    let index = mingit::Index::load(&repo).unwrap();
    let reparsed = mingit::Index::parse(&index.serialize()).unwrap();
    assert_eq!(reparsed, index);
    let paths: Vec<_> = reparsed.entries().iter().map(|e| e.path.clone()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
}

#[test]
fn stash_push_and_pop_cycle() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    add_commit(&repo, "a.txt", b"A\n", "c1");

    write_file(&repo, "a.txt", b"work in progress\n");
    ops::stash_push(&repo, Some("wip")).unwrap();
    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"A\n");

    ops::stash_pop(&repo, None).unwrap();
    assert_eq!(
        fs::read(dir.path().join("a.txt")).unwrap(),
        b"work in progress\n"
    );
    assert!(ops::stash_list(&repo).unwrap().is_empty());
}
