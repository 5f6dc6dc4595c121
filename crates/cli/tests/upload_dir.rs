use cli::upload::{collect_uploads, upload_path};
use providers::memory::MemoryDirectory;
use providers::RemoteDirectory;
use std::fs;
use tempfile::tempdir;

#[test]
fn collect_skips_hidden_and_excluded() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("nested")).unwrap();
    fs::create_dir_all(root.join(".git")).unwrap();
    fs::write(root.join("a.json"), "{}").unwrap();
    fs::write(root.join("nested/b.pdf"), "%PDF-1.4").unwrap();
    fs::write(root.join("nested/scratch.tmp"), "x").unwrap();
    fs::write(root.join(".hidden.json"), "{}").unwrap();
    fs::write(root.join(".git/config"), "x").unwrap();

    let files = collect_uploads(root, &["*.tmp".to_string()]).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.json", "b.pdf"]);
}

#[test]
fn single_file_is_taken_as_is() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("takeout.zip");
    fs::write(&file, "PK").unwrap();
    assert_eq!(collect_uploads(&file, &[]).unwrap(), vec![file]);
    assert!(collect_uploads(&temp.path().join("missing"), &[]).is_err());
}

#[tokio::test]
async fn directory_upload_lands_in_target_folder_with_sniffed_mime() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("order.json"), r#"{"item_name":"Lamp"}"#).unwrap();
    fs::write(temp.path().join("invoice.bin"), b"%PDF-1.7\n").unwrap();
    fs::write(temp.path().join("notes"), "plain words").unwrap();

    let dir = MemoryDirectory::new();
    let amazon = dir.add_folder("Amazon", "root");
    let report = upload_path(&dir, temp.path(), &amazon, &[]).await.unwrap();
    assert_eq!(report.uploaded.len(), 3);
    assert!(report.failed.is_empty());

    let listed = dir.list_children(&amazon).await.unwrap();
    let mime_of = |name: &str| {
        listed
            .iter()
            .find(|n| n.name == name)
            .map(|n| n.mime_type.clone())
            .unwrap()
    };
    assert_eq!(mime_of("order.json"), "application/json");
    assert_eq!(mime_of("invoice.bin"), "application/pdf");
    assert_eq!(mime_of("notes"), "application/octet-stream");
}
