mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures_util::StreamExt;

use cms_asset::{
    ArchiveExtractor, AssetInteractor, CreateAssetParam, CreateUploadParam, DecompressHandler, UpdateAssetParam,
};
use cms_blob::{
    AccessInfo, BlobGateway, BlobResult, DeleteCall, FileEntry, GatewayCapabilities, GatewayConfig, MemoryGateway,
    ReadHeaders, ReadResponse, ReadStatus, UploadFile, UploadLink, UploadLinkParams,
};
use cms_core::{
    root_path, ArchiveExtractionStatus, Asset, AssetId, CmsResult, ErrorKind, EventType, File, Operator, PreviewType,
    ProjectId, UploadTicket, Webhook,
};
use cms_queue::{JobId, TaskHandler, TaskPayload};
use cms_store::{AssetSearch, MemoryUploadRepository, UploadRepository, WebhookRepository};
use common::{bytes, Harness};

/// A1. Inline Non-Archive Upload Is Done Immediately
#[tokio::test]
async fn test_create_inline_image() {
    let h = Harness::new();

    // Arrange
    let file = UploadFile::from_bytes("photo.jpg", bytes(12_345)).with_content_type("image/jpeg");

    // Act
    let (asset, top) = h
        .interactor
        .create(&h.writer(), CreateAssetParam::inline(h.project, file))
        .await
        .unwrap();

    // Assert
    assert_eq!(asset.size(), 12_345);
    assert_eq!(asset.archive_extraction_status(), ArchiveExtractionStatus::Done);
    assert_eq!(asset.preview_type(), PreviewType::Image);
    assert_eq!(asset.content_type(), "image/jpeg");
    assert!(asset.thread().is_some());
    assert_eq!(top.path, "/photo.jpg");

    let stored = h.interactor.find_by_id(&h.writer(), asset.id()).await.unwrap();
    assert_eq!(stored, asset);
    assert!(h.gateway.contains(asset.uuid(), "photo.jpg"));
    assert!(h.dispatcher.payloads().is_empty());
    assert_eq!(h.event_types().await, vec!["asset.create"]);
}

/// A2. Gzip Encoded Uploads Drop The .gz Suffix
#[tokio::test]
async fn test_create_strips_gz_suffix() {
    let h = Harness::new();
    let file = UploadFile::from_bytes("uploads/points.csv.gz", bytes(64)).with_content_encoding("gzip");

    // Act
    let (asset, top) = h
        .interactor
        .create(&h.writer(), CreateAssetParam::inline(h.project, file))
        .await
        .unwrap();

    // Assert
    assert_eq!(asset.file_name(), "points.csv");
    assert_eq!(asset.content_encoding(), "gzip");
    assert_eq!(top.content_encoding, "gzip");
    assert!(h.gateway.contains(asset.uuid(), "points.csv"));
}

/// A3. Create Requires Write Access On The Workspace
#[tokio::test]
async fn test_create_denied_for_reader() {
    let h = Harness::new();

    // Act
    let err = h
        .interactor
        .create(
            &h.reader(),
            CreateAssetParam::inline(h.project, UploadFile::from_bytes("a.png", bytes(8))),
        )
        .await
        .unwrap_err();

    // Assert: nothing was uploaded
    assert_eq!(err.kind(), ErrorKind::OperationDenied);
    assert_eq!(h.gateway.object_count(), 0);
    assert!(h.event_types().await.is_empty());
}

/// A4. Neither File Nor Token
#[tokio::test]
async fn test_create_without_file() {
    let h = Harness::new();
    let param = CreateAssetParam {
        project: h.project,
        file: None,
        token: None,
        skip_decompression: false,
    };

    let err = h.interactor.create(&h.writer(), param).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotIncluded);
}

/// B1. Zip Upload Is Queued For Extraction
#[tokio::test]
async fn test_create_zip_enqueues_decompression() {
    let h = Harness::new();

    // Act
    let (asset, _) = h.create_inline("bundle.zip", bytes(4_000_000)).await;

    // Assert: pending was flipped to in-progress once the task was queued
    assert_eq!(asset.archive_extraction_status(), ArchiveExtractionStatus::InProgress);
    let expected_path = root_path(asset.uuid(), "bundle.zip");
    assert_eq!(expected_path, format!("{}/{}/bundle.zip", &asset.uuid()[..2], &asset.uuid()[2..]));
    assert_eq!(
        h.dispatcher.payloads(),
        vec![TaskPayload::decompress(asset.id(), expected_path)]
    );

    let stored = h.interactor.find_by_id(&h.writer(), asset.id()).await.unwrap();
    assert_eq!(stored.archive_extraction_status(), ArchiveExtractionStatus::InProgress);
    assert_eq!(h.threads.created().len(), 1);
}

/// B2. Skipped Decompression
#[tokio::test]
async fn test_create_zip_skipping_decompression() {
    let h = Harness::new();
    let param = CreateAssetParam::inline(h.project, UploadFile::from_bytes("Bundle.ZIP", bytes(32))).skip_decompression(true);

    let (asset, _) = h.interactor.create(&h.writer(), param).await.unwrap();

    assert_eq!(asset.archive_extraction_status(), ArchiveExtractionStatus::Skipped);
    assert!(h.dispatcher.payloads().is_empty());
}

/// B3. Enqueue Failure Aborts The Create
#[tokio::test]
async fn test_dispatch_failure_rolls_back() {
    let h = Harness::new();
    h.dispatcher.set_fail(true);

    // Act
    let err = h
        .interactor
        .create(
            &h.writer(),
            CreateAssetParam::inline(h.project, UploadFile::from_bytes("bundle.zip", bytes(16))),
        )
        .await
        .unwrap_err();

    // Assert: no pending asset without a job, blob cleaned up, no event
    assert_ne!(err.kind(), ErrorKind::OperationDenied);
    let page = h.interactor.search(&h.writer(), h.project, &AssetSearch::new()).await.unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(h.gateway.object_count(), 0);
    assert!(matches!(h.gateway.delete_calls().as_slice(), [DeleteCall::Asset { file_name, .. }] if file_name == "bundle.zip"));
    assert!(h.event_types().await.is_empty());
}

/// B4. Serialisation Conflicts Are Retried
#[tokio::test]
async fn test_create_retries_conflicts() {
    let h = Harness::new();
    h.db.fail_next_commits(1);

    // Act
    let (asset, _) = h.create_inline("bundle.zip", bytes(16)).await;

    // Assert: the retried attempt is the only one that stuck
    let page = h.interactor.search(&h.writer(), h.project, &AssetSearch::new()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id(), asset.id());
    assert_eq!(h.event_types().await, vec!["asset.create"]);

    // Assert: one job and one thread, reused by the retry
    assert_eq!(h.dispatcher.payloads().len(), 1);
    assert_eq!(h.threads.created().len(), 1);
    assert_eq!(asset.thread(), Some(h.threads.created()[0].0));
}

/// B5. Retrying A Failed Extraction Under Conflict Enqueues Once
#[tokio::test]
async fn test_retry_decompression_retries_conflicts() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("bundle.zip", bytes(16)).await;
    h.interactor
        .update_files(&Operator::machine(), asset.id(), ArchiveExtractionStatus::Failed)
        .await
        .unwrap();
    h.db.fail_next_commits(2);

    // Act
    let retried = h.interactor.retry_decompression(&h.writer(), asset.id()).await.unwrap();

    // Assert
    assert_eq!(retried.archive_extraction_status(), ArchiveExtractionStatus::InProgress);
    assert_eq!(h.dispatcher.payloads().len(), 2);
}

/// C1. Extraction Done Indexes Entries And Detects 3D Tiles
#[tokio::test]
async fn test_update_files_done() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("bundle.zip", bytes(4_000_000)).await;

    // Arrange: the worker unpacked two entries next to the archive
    h.gateway.seed_extracted(
        asset.uuid(),
        &[FileEntry::new("tileset.json", 1024), FileEntry::new("a/b.bin", 2048)],
    );

    // Act
    let updated = h
        .interactor
        .update_files(&Operator::machine(), asset.id(), ArchiveExtractionStatus::Done)
        .await
        .unwrap();

    // Assert
    assert_eq!(updated.archive_extraction_status(), ArchiveExtractionStatus::Done);
    assert_eq!(updated.preview_type(), PreviewType::Geo3dTiles);
    assert!(updated.flat_files());

    let tree = h.interactor.find_file_by_asset(&h.writer(), asset.id()).await.unwrap();
    let paths: Vec<&str> = tree.flat_files().iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["/tileset.json", "/a/b.bin"]);
    assert_eq!(tree.flat_files()[1].name, "b.bin");
    assert_eq!(tree.flat_files()[1].size, 2048);
    assert_eq!(h.event_types().await, vec!["asset.create", "asset.decompress"]);
}

/// C2. Reporting Done Twice Changes Nothing
#[tokio::test]
async fn test_update_files_is_idempotent() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("bundle.zip", bytes(16)).await;
    let machine = Operator::machine();
    h.interactor
        .update_files(&machine, asset.id(), ArchiveExtractionStatus::Done)
        .await
        .unwrap();

    // Act
    let again = h
        .interactor
        .update_files(&machine, asset.id(), ArchiveExtractionStatus::Failed)
        .await
        .unwrap();

    // Assert: done is terminal and no second event fires
    assert_eq!(again.archive_extraction_status(), ArchiveExtractionStatus::Done);
    assert_eq!(h.event_types().await, vec!["asset.create", "asset.decompress"]);
}

/// C3. Failed Extraction Can Be Retried
#[tokio::test]
async fn test_failed_extraction_retry() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("bundle.zip", bytes(16)).await;

    // Arrange
    let failed = h
        .interactor
        .update_files(&Operator::machine(), asset.id(), ArchiveExtractionStatus::Failed)
        .await
        .unwrap();
    assert_eq!(failed.archive_extraction_status(), ArchiveExtractionStatus::Failed);
    assert!(!failed.flat_files());

    // Act
    let retried = h.interactor.retry_decompression(&h.writer(), asset.id()).await.unwrap();

    // Assert: a second task for the same archive
    assert_eq!(retried.archive_extraction_status(), ArchiveExtractionStatus::InProgress);
    assert_eq!(h.dispatcher.payloads().len(), 2);
}

/// C4. Illegal Status Moves Are Rejected
#[tokio::test]
async fn test_update_files_invalid_transition() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("bundle.zip", bytes(16)).await;

    let err = h
        .interactor
        .update_files(&Operator::machine(), asset.id(), ArchiveExtractionStatus::Pending)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    let err = h.interactor.retry_decompression(&h.writer(), asset.id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

/// C5. Only Updaters Or The Machine May Report Extraction
#[tokio::test]
async fn test_update_files_requires_authority() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("bundle.zip", bytes(16)).await;

    let err = h
        .interactor
        .update_files(&h.reader(), asset.id(), ArchiveExtractionStatus::Done)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationDenied);
}

/// C8. Outsiders Cannot Tell Existing Ids From Missing Ones
#[tokio::test]
async fn test_update_files_hides_unreadable_assets() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("bundle.zip", bytes(16)).await;
    let outsider = h.outsider();

    // Act
    let existing = h
        .interactor
        .update_files(&outsider, asset.id(), ArchiveExtractionStatus::Done)
        .await
        .unwrap_err();
    let missing = h
        .interactor
        .update_files(&outsider, AssetId::new(), ArchiveExtractionStatus::Done)
        .await
        .unwrap_err();

    // Assert
    assert_eq!(existing.kind(), ErrorKind::NotFound);
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    let stored = h.interactor.find_by_id(&h.writer(), asset.id()).await.unwrap();
    assert_eq!(stored.archive_extraction_status(), ArchiveExtractionStatus::InProgress);
}

/// Writes a fixed set of entries below the archive's prefix.
struct SeedingExtractor {
    gateway: MemoryGateway,
    entries: Vec<FileEntry>,
    fail: bool,
}

#[async_trait]
impl ArchiveExtractor for SeedingExtractor {
    async fn extract(&self, path: &str) -> CmsResult<()> {
        if self.fail {
            return Err(cms_core::CmsError::io("truncated archive"));
        }
        let uuid: String = path.split('/').take(2).collect();
        self.gateway.seed_extracted(&uuid, &self.entries);
        Ok(())
    }
}

/// C6. Decompress Handler Reports Back Through The Interactor
#[tokio::test]
async fn test_decompress_handler() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("tiles.zip", bytes(16)).await;
    let handler = DecompressHandler::new(
        h.interactor.clone(),
        Arc::new(SeedingExtractor {
            gateway: h.gateway.clone(),
            entries: vec![FileEntry::new("z/0/0/0.mvt", 10)],
            fail: false,
        }),
    );

    // Act
    let payload = h.dispatcher.payloads().pop().unwrap();
    handler.handle(&JobId::new(), payload).await.unwrap();

    // Assert
    let stored = h.interactor.find_by_id(&h.writer(), asset.id()).await.unwrap();
    assert_eq!(stored.archive_extraction_status(), ArchiveExtractionStatus::Done);
    assert_eq!(stored.preview_type(), PreviewType::GeoMvt);
}

/// C7. Extractor Errors Mark The Asset Failed
#[tokio::test]
async fn test_decompress_handler_failure() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("tiles.zip", bytes(16)).await;
    let handler = DecompressHandler::new(
        h.interactor.clone(),
        Arc::new(SeedingExtractor {
            gateway: h.gateway.clone(),
            entries: Vec::new(),
            fail: true,
        }),
    );

    // Act
    let payload = h.dispatcher.payloads().pop().unwrap();
    let err = handler.handle(&JobId::new(), payload).await.unwrap_err();

    // Assert
    assert!(!err.is_retryable());
    let stored = h.interactor.find_by_id(&h.writer(), asset.id()).await.unwrap();
    assert_eq!(stored.archive_extraction_status(), ArchiveExtractionStatus::Failed);
}

/// D1. Expired Ticket
#[tokio::test]
async fn test_create_from_expired_ticket() {
    let h = Harness::new();

    // Arrange: a ticket that expired a minute ago, with its blob staged
    let ticket = UploadTicket::new("0a1b2c3d-expired", h.project, "bundle.zip", Duration::days(7))
        .with_expires_at(Utc::now() - Duration::minutes(1));
    MemoryUploadRepository::new(h.db.clone()).save(&ticket).await.unwrap();
    h.gateway.put_object(&ticket.uuid, "bundle.zip", bytes(16), "application/zip");

    // Act
    let err = h
        .interactor
        .create(&h.writer(), CreateAssetParam::from_token(h.project, ticket.uuid.clone()))
        .await
        .unwrap_err();

    // Assert
    assert_eq!(err.kind(), ErrorKind::TicketExpired);
    let page = h.interactor.search(&h.writer(), h.project, &AssetSearch::new()).await.unwrap();
    assert_eq!(page.total, 0);
    assert!(h.event_types().await.is_empty());
}

/// D2. Upload Link Then Create From Its Token
#[tokio::test]
async fn test_create_upload_then_create_from_token() {
    let h = Harness::new();

    // Arrange: ask for a link
    let info = h
        .interactor
        .create_upload(
            &h.writer(),
            CreateUploadParam {
                project: h.project,
                file_name: "scan.png".into(),
                content_length: 128,
                ..CreateUploadParam::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(info.next, "");
    assert_eq!(info.content_type, "image/png");
    assert!(info.url.contains(&root_path(&info.uuid, "scan.png")));

    // the client uploads to the link
    h.gateway.put_object(&info.uuid, "scan.png", bytes(128), "image/png");

    // Act
    let (asset, top) = h
        .interactor
        .create(&h.writer(), CreateAssetParam::from_token(h.project, info.uuid.clone()))
        .await
        .unwrap();

    // Assert
    assert_eq!(asset.uuid(), info.uuid);
    assert_eq!(asset.size(), 128);
    assert_eq!(asset.preview_type(), PreviewType::Image);
    assert_eq!(top.name, "scan.png");
}

/// D3. Multipart Cursors Are Wrapped With The Upload Uuid
#[tokio::test]
async fn test_create_upload_walks_parts() {
    let h = Harness::with_gateway(MemoryGateway::new(GatewayConfig::default().with_part_size(10)));
    let writer = h.writer();
    let param = CreateUploadParam {
        project: h.project,
        file_name: "big.bin".into(),
        content_length: 25,
        ..CreateUploadParam::default()
    };

    // Act
    let first = h.interactor.create_upload(&writer, param.clone()).await.unwrap();
    let second = h
        .interactor
        .create_upload(&writer, CreateUploadParam { cursor: first.next.clone(), ..param.clone() })
        .await
        .unwrap();
    let third = h
        .interactor
        .create_upload(&writer, CreateUploadParam { cursor: second.next.clone(), ..param.clone() })
        .await
        .unwrap();

    // Assert
    assert_eq!(first.next, format!("{}_2", first.uuid));
    assert_eq!(second.uuid, first.uuid);
    assert_eq!(second.next, format!("{}_3", first.uuid));
    assert_eq!((first.content_length, second.content_length, third.content_length), (10, 10, 5));
    assert_eq!(third.next, "");
}

/// D4. Cursors Are Checked Against The Ticket
#[tokio::test]
async fn test_create_upload_rejects_bad_cursors() {
    let h = Harness::with_gateway(MemoryGateway::new(GatewayConfig::default().with_part_size(10)));
    let writer = h.writer();
    let first = h
        .interactor
        .create_upload(
            &writer,
            CreateUploadParam {
                project: h.project,
                file_name: "big.bin".into(),
                content_length: 25,
                ..CreateUploadParam::default()
            },
        )
        .await
        .unwrap();

    // malformed
    let err = h
        .interactor
        .create_upload(
            &writer,
            CreateUploadParam {
                project: h.project,
                cursor: "no-separator".into(),
                ..CreateUploadParam::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // another project of the same workspace
    let other = ProjectId::new();
    h.projects.insert(other, h.workspace);
    let machine = Operator::machine();
    let err = h
        .interactor
        .create_upload(
            &machine,
            CreateUploadParam {
                project: other,
                cursor: first.next.clone(),
                ..CreateUploadParam::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // unknown ticket
    let err = h
        .interactor
        .create_upload(
            &writer,
            CreateUploadParam {
                project: h.project,
                cursor: "missing_2".into(),
                ..CreateUploadParam::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// E1. Publish And Unpublish Flip The Object ACL
#[tokio::test]
async fn test_publish_and_unpublish() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("map.geojson", bytes(40)).await;
    assert_eq!(asset.preview_type(), PreviewType::Geo);

    // Act + Assert
    let published = h.interactor.publish_asset(&h.writer(), asset.id()).await.unwrap();
    assert!(published.public());
    assert!(h.gateway.is_public(asset.uuid(), "map.geojson"));

    let hidden = h.interactor.unpublish_asset(&h.writer(), asset.id()).await.unwrap();
    assert!(!hidden.public());
    assert!(!h.gateway.is_public(asset.uuid(), "map.geojson"));

    let err = h.interactor.publish_asset(&h.reader(), asset.id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationDenied);
}

/// E2. Delete Removes Blob, Record And Files
#[tokio::test]
async fn test_delete() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("photo.jpg", bytes(40)).await;

    // Act
    let deleted = h.interactor.delete(&h.writer(), asset.id()).await.unwrap();

    // Assert
    assert_eq!(deleted, asset.id());
    assert_eq!(
        h.gateway.delete_calls(),
        vec![DeleteCall::Asset {
            uuid: asset.uuid().to_string(),
            file_name: "photo.jpg".to_string()
        }]
    );
    let err = h.interactor.find_by_id(&h.writer(), asset.id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = h.interactor.find_file_by_asset(&Operator::machine(), asset.id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.event_types().await, vec!["asset.create", "asset.delete"]);
}

/// E3. Batch Delete With A Missing Id Touches Nothing
#[tokio::test]
async fn test_batch_delete_partial_miss() {
    let h = Harness::new();
    let (a, _) = h.create_inline("a.png", bytes(8)).await;
    let (b, _) = h.create_inline("b.png", bytes(8)).await;

    // Act
    let err = h
        .interactor
        .batch_delete(&h.writer(), &[a.id(), b.id(), AssetId::new()])
        .await
        .unwrap_err();

    // Assert
    assert_eq!(err.kind(), ErrorKind::PartialNotFound);
    assert!(h.gateway.delete_calls().is_empty());
    assert!(h.interactor.find_by_id(&h.writer(), a.id()).await.is_ok());
    assert!(h.interactor.find_by_id(&h.writer(), b.id()).await.is_ok());
}

/// E4. Batch Delete Issues One Gateway Call And No Events
#[tokio::test]
async fn test_batch_delete() {
    let h = Harness::new();
    let mut ids = Vec::new();
    let mut uuids = Vec::new();
    for name in ["a.png", "b.png", "c.png"] {
        let (asset, _) = h.create_inline(name, bytes(8)).await;
        ids.push(asset.id());
        uuids.push(asset.uuid().to_string());
    }

    // Act: duplicates in the request are harmless
    let mut request = ids.clone();
    request.push(ids[0]);
    let deleted = h.interactor.batch_delete(&h.writer(), &request).await.unwrap();

    // Assert
    assert_eq!(deleted, ids);
    assert_eq!(h.gateway.delete_calls(), vec![DeleteCall::Assets(uuids)]);
    for id in &ids {
        let err = h.interactor.find_by_id(&h.writer(), *id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
    assert_eq!(h.event_types().await, vec!["asset.create"; 3]);
}

/// Memory gateway that reports an extraction as done while an ACL change is
/// in flight.
struct RacingGateway {
    inner: MemoryGateway,
    armed: Mutex<Option<(AssetInteractor, AssetId)>>,
}

#[async_trait]
impl BlobGateway for RacingGateway {
    async fn upload_asset(&self, file: UploadFile) -> BlobResult<(String, u64)> {
        self.inner.upload_asset(file).await
    }

    async fn issue_upload_link(&self, params: UploadLinkParams) -> BlobResult<UploadLink> {
        self.inner.issue_upload_link(params).await
    }

    async fn uploaded_asset(&self, ticket: &UploadTicket) -> BlobResult<File> {
        self.inner.uploaded_asset(ticket).await
    }

    async fn read_asset(&self, uuid: &str, file_name: &str, headers: &ReadHeaders) -> BlobResult<ReadResponse> {
        self.inner.read_asset(uuid, file_name, headers).await
    }

    async fn get_asset_files(&self, uuid: &str) -> BlobResult<Vec<FileEntry>> {
        self.inner.get_asset_files(uuid).await
    }

    async fn delete_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.inner.delete_asset(uuid, file_name).await
    }

    async fn delete_assets(&self, uuids: &[String]) -> BlobResult<()> {
        self.inner.delete_assets(uuids).await
    }

    async fn publish_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.inner.publish_asset(uuid, file_name).await?;
        let armed = self.armed.lock().unwrap().take();
        if let Some((interactor, id)) = armed {
            interactor
                .update_files(&Operator::machine(), id, ArchiveExtractionStatus::Done)
                .await
                .unwrap();
        }
        Ok(())
    }

    async fn unpublish_asset(&self, uuid: &str, file_name: &str) -> BlobResult<()> {
        self.inner.unpublish_asset(uuid, file_name).await
    }

    fn access_info(&self, asset: &Asset) -> AccessInfo {
        self.inner.access_info(asset)
    }

    async fn remove_asset(&self, url: &str) -> BlobResult<()> {
        self.inner.remove_asset(url).await
    }

    fn capabilities(&self) -> GatewayCapabilities {
        self.inner.capabilities()
    }
}

/// E5. Publishing Keeps An Extraction Reported Mid-Flight
#[tokio::test]
async fn test_publish_does_not_overwrite_concurrent_extraction() {
    // Arrange
    let gateway = MemoryGateway::default();
    let racing = Arc::new(RacingGateway {
        inner: gateway.clone(),
        armed: Mutex::new(None),
    });
    let h = Harness::with_blob(gateway, racing.clone());
    let (asset, _) = h.create_inline("bundle.zip", bytes(16)).await;
    h.gateway.seed_extracted(asset.uuid(), &[FileEntry::new("tileset.json", 12)]);
    *racing.armed.lock().unwrap() = Some((h.interactor.clone(), asset.id()));

    // Act
    let published = h.interactor.publish_asset(&h.writer(), asset.id()).await.unwrap();

    // Assert: both changes survive
    assert!(published.public());
    assert_eq!(published.archive_extraction_status(), ArchiveExtractionStatus::Done);
    let stored = h.interactor.find_by_id(&h.writer(), asset.id()).await.unwrap();
    assert!(stored.public());
    assert_eq!(stored.archive_extraction_status(), ArchiveExtractionStatus::Done);
    assert!(stored.flat_files());
    assert_eq!(stored.preview_type(), PreviewType::Geo3dTiles);
}

/// F1. Searching A Project Without Read Access Is Empty, Not An Error
#[tokio::test]
async fn test_denied_search_is_empty() {
    let h = Harness::new();
    h.create_inline("a.png", bytes(8)).await;

    let page = h
        .interactor
        .search(&h.outsider(), h.project, &AssetSearch::new())
        .await
        .unwrap();

    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());
    assert!(!page.has_next);
}

/// F2. Storage Quota Breach Removes The Uploaded Blob
#[tokio::test]
async fn test_quota_breach() {
    let h = Harness::new();
    h.policies.set_quota(h.workspace, 100);
    let (kept, _) = h.create_inline("a.png", bytes(60)).await;

    // Act
    let err = h
        .interactor
        .create(
            &h.writer(),
            CreateAssetParam::inline(h.project, UploadFile::from_bytes("b.png", bytes(60))),
        )
        .await
        .unwrap_err();

    // Assert
    assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    assert!(matches!(h.gateway.delete_calls().as_slice(), [DeleteCall::Url(url)] if url.ends_with("/b.png")));
    assert_eq!(h.gateway.object_count(), 1);
    let page = h.interactor.search(&h.writer(), h.project, &AssetSearch::new()).await.unwrap();
    assert_eq!(page.items, vec![kept]);
}

/// F3. Committed Events Reach Subscribed Webhooks
#[tokio::test]
async fn test_create_notifies_webhooks() {
    let h = Harness::new();
    let hook = Webhook::new(h.workspace, "assets", "https://hooks.test/cms", "s3cret").with_trigger(EventType::AssetCreate);
    h.webhooks.save(&hook).await.unwrap();

    // Act
    let (asset, _) = h.create_inline("photo.jpg", bytes(8)).await;
    h.wait_for_deliveries(1).await;

    // Assert
    let (target, delivery) = h.sender.attempts().pop().unwrap();
    assert_eq!(target, hook.id);
    let body = delivery.body_json().unwrap();
    assert_eq!(body["type"], "asset.create");
    assert_eq!(body["data"]["id"], asset.id().to_string());
    assert!(cms_events::verify("s3cret", &delivery.signature, &delivery.body));
}

/// F4. Download Honours Ranges
#[tokio::test]
async fn test_download_range() {
    let h = Harness::new();
    let data: Vec<u8> = (0u8..100).collect();
    let (asset, _) = h.create_inline("seq.bin", data).await;

    // Act
    let response = h
        .interactor
        .download(&h.reader(), asset.id(), &ReadHeaders::default().with_range("bytes=10-19"))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.headers.status, ReadStatus::PartialContent);
    assert_eq!(response.headers.content_range.as_deref(), Some("bytes 10-19/100"));
    let mut body = response.body;
    let mut got = Vec::new();
    while let Some(chunk) = body.next().await {
        got.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(got, (10u8..20).collect::<Vec<_>>());

    let err = h
        .interactor
        .download(&h.outsider(), asset.id(), &ReadHeaders::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// F5. File Trees Only For Readable Assets
#[tokio::test]
async fn test_find_files_by_assets() {
    let h = Harness::new();
    let (a, _) = h.create_inline("a.png", bytes(8)).await;
    let (b, _) = h.create_inline("b.png", bytes(8)).await;

    let trees = h
        .interactor
        .find_files_by_assets(&h.reader(), &[a.id(), b.id(), AssetId::new()])
        .await
        .unwrap();
    assert_eq!(trees.len(), 2);
    assert_eq!(trees[&a.id()].name, "a.png");

    let none = h.interactor.find_files_by_assets(&h.outsider(), &[a.id()]).await.unwrap();
    assert!(none.is_empty());

    let by_uuid = h.interactor.find_by_uuid(&h.reader(), b.uuid()).await.unwrap();
    assert_eq!(by_uuid.id(), b.id());
}

/// F6. Preview Type Override
#[tokio::test]
async fn test_update_preview_type() {
    let h = Harness::new();
    let (asset, _) = h.create_inline("scene.bin", bytes(8)).await;
    assert_eq!(asset.preview_type(), PreviewType::Unknown);

    let updated = h
        .interactor
        .update(
            &h.writer(),
            UpdateAssetParam {
                id: asset.id(),
                preview_type: Some(PreviewType::Model3d),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.preview_type(), PreviewType::Model3d);
    let stored = h.interactor.find_by_id(&h.reader(), asset.id()).await.unwrap();
    assert_eq!(stored.preview_type(), PreviewType::Model3d);
}

/// F7. Project Teardown
#[tokio::test]
async fn test_delete_project_assets() {
    let h = Harness::new();
    h.create_inline("a.png", bytes(8)).await;
    h.create_inline("b.png", bytes(8)).await;

    let err = h.interactor.delete_project_assets(&h.reader(), h.project).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationDenied);

    let removed = h.interactor.delete_project_assets(&h.writer(), h.project).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(h.gateway.object_count(), 0);
}

/// F8. Concurrent Uploads Cannot Overshoot The Quota Together
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_creates_respect_quota() {
    let h = Harness::new();
    h.policies.set_quota(h.workspace, 100);
    h.create_inline("base.png", bytes(30)).await;

    // Act: two uploads that each fit alone but not together
    let uploads: Vec<_> = ["a.png", "b.png"]
        .into_iter()
        .map(|name| {
            let interactor = h.interactor.clone();
            let writer = h.writer();
            let param = CreateAssetParam::inline(h.project, UploadFile::from_bytes(name, bytes(50)));
            tokio::spawn(async move { interactor.create(&writer, param).await })
        })
        .collect();
    let mut results = Vec::new();
    for upload in uploads {
        results.push(upload.await.unwrap());
    }

    // Assert
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let refused: Vec<ErrorKind> = results.iter().filter_map(|r| r.as_ref().err()).map(|e| e.kind()).collect();
    assert_eq!(accepted, 1);
    assert_eq!(refused, vec![ErrorKind::PolicyViolation]);

    let page = h.interactor.search(&h.writer(), h.project, &AssetSearch::new()).await.unwrap();
    let used: u64 = page.items.iter().map(|a| a.size()).sum();
    assert_eq!(page.total, 2);
    assert!(used <= 100);
    assert_eq!(h.gateway.object_count(), 2);
}
