use super::*;
use mindcanvas_core::{Connection, Group, Node, NodeId, Transform, Vec2};

fn sample_document(name: &str, nodes: usize) -> CanvasDocument {
    let mut document = CanvasDocument::empty(name);
    document.nodes = (0..nodes)
        .map(|i| Node::new(Vec2::new(i as f32 * 300.0, 0.0)))
        .collect();
    if nodes >= 2 {
        document.connections = vec![Connection::new(document.nodes[0].id, document.nodes[1].id)];
        let mut group = Group::new("Pair", "#123456");
        for node in document.nodes.iter_mut().take(2) {
            group.insert(node.id);
            node.group_id = Some(group.id);
        }
        document.groups = vec![group];
    }
    document.transform = Transform::new(Vec2::new(10.0, 20.0), 1.5);
    document
}

#[test]
fn test_save_and_load_round_trip() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    let document = sample_document("Board", 3);

    let summary = storage.save_canvas("board", &document)?;
    assert_eq!(summary.node_count, 3);
    assert_eq!(storage.used_bytes()?, summary.byte_size);

    let loaded = storage.load_canvas("board")?.expect("stored");
    assert_eq!(loaded, document);
    assert!(storage.load_canvas("missing")?.is_none());
    Ok(())
}

#[test]
fn test_resave_replaces_previous_version() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    storage.save_canvas("board", &sample_document("Board", 3))?;
    let smaller = storage.save_canvas("board", &sample_document("Board", 1))?;

    assert_eq!(storage.list_canvases()?.len(), 1);
    assert_eq!(storage.used_bytes()?, smaller.byte_size);
    Ok(())
}

#[test]
fn test_quota_exhaustion_is_distinct_and_writes_nothing() -> Result<(), StorageError> {
    let document = sample_document("Board", 2);
    let size = export_json(&document)?.len() as u64;
    let storage = Storage::new_in_memory()?.with_quota(Some(size + 10));

    storage.save_canvas("first", &document)?;
    let err = storage
        .save_canvas("second", &document)
        .expect_err("quota should be exceeded");

    assert!(err.is_exhausted());
    match err {
        StorageError::Exhausted {
            required_bytes,
            quota_bytes,
        } => {
            assert_eq!(required_bytes, size * 2);
            assert_eq!(quota_bytes, size + 10);
        }
        other => panic!("Expected Exhausted, got {other:?}"),
    }
    assert_eq!(storage.list_canvases()?.len(), 1);

    // Overwriting the existing entry only needs the difference.
    storage.save_canvas("first", &document)?;
    Ok(())
}

#[test]
fn test_list_and_delete() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    storage.save_canvas("a", &sample_document("A", 1))?;
    storage.save_canvas("b", &sample_document("B", 2))?;

    let names: Vec<String> = storage
        .list_canvases()?
        .into_iter()
        .map(|summary| summary.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"A".to_string()));

    assert!(storage.delete_canvas("a")?);
    assert!(!storage.delete_canvas("a")?);
    assert_eq!(storage.list_canvases()?.len(), 1);
    Ok(())
}

#[test]
fn test_import_rejects_malformed_documents() {
    assert!(matches!(
        import_json("{ not json"),
        Err(StorageError::Malformed(ImportError::Parse(_)))
    ));

    let mut document = sample_document("Board", 2);
    document.connections.push(Connection::new(document.nodes[0].id, NodeId::new()));
    let json = export_json(&document).unwrap();
    assert!(matches!(
        import_json(&json),
        Err(StorageError::Malformed(ImportError::DanglingConnection { .. }))
    ));
}

#[test]
fn test_export_uses_camel_case_fields() -> Result<(), StorageError> {
    let json = export_json(&sample_document("Board", 2))?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["canvasName"], "Board");
    assert!(value["connections"][0]["fromNodeId"].is_string());
    assert!(value["nodes"][0]["groupId"].is_string());
    assert_eq!(value["transform"]["scale"], 1.5);
    Ok(())
}

#[test]
fn test_file_round_trip_and_persistence() -> Result<(), StorageError> {
    let dir = tempfile::tempdir()?;
    let document = sample_document("Board", 2);

    let path = dir.path().join("board.json");
    write_document(&path, &document)?;
    assert_eq!(read_document(&path)?, document);

    let db_path = dir.path().join("canvases.db");
    {
        let storage = Storage::open(&db_path)?;
        storage.save_canvas("board", &document)?;
    }
    let reopened = Storage::open(&db_path)?;
    assert_eq!(reopened.load_canvas("board")?, Some(document));
    assert_eq!(reopened.schema_version()?, SCHEMA_VERSION);
    Ok(())
}

#[test]
fn test_failed_write_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    // A directory in the way makes the final rename fail.
    let target = dir.path().join("board.json");
    std::fs::create_dir(&target).unwrap();

    let result = write_document(&target, &sample_document("Board", 1));

    assert!(matches!(result, Err(StorageError::Io(_))));
    assert!(!dir.path().join("board.json.tmp").exists());
    assert!(target.is_dir());
}
