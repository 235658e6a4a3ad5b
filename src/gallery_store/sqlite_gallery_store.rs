use super::models::{
    normalize_folder_path, Folder, InheritedTagBinding, MediaItem, MetadataUpdate,
    TagInheritanceSnapshot,
};
use super::schema::GALLERY_VERSIONED_SCHEMAS;
use super::GalleryStore;
use crate::media_codec::CropRect;
use crate::sqlite_persistence::{
    format_datetime, initialize_database, open_connection, parse_datetime,
};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const MEDIA_COLUMNS: &str = "id, folder_id, file_path, metadata_extracted_at, mime_type, \
     byte_size, taken_at, width, height, crop_x, crop_y, crop_width, crop_height, \
     thumbnail_path, thumbnail_updated_at";

pub struct SqliteGalleryStore {
    conn: Mutex<Connection>,
}

impl SqliteGalleryStore {
    /// Creates or migrates the gallery database. Call once at startup.
    pub fn initialize<P: AsRef<Path>>(db_path: P) -> Result<()> {
        initialize_database(db_path.as_ref(), GALLERY_VERSIONED_SCHEMAS, "gallery")
    }

    /// Opens a new connection to an already initialized gallery database.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_connection(db_path.as_ref()).context("Failed to open gallery database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::initialize(db_path.as_ref())?;
        Self::open(db_path)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Gallery connection mutex poisoned"))
    }

    fn row_to_media(row: &rusqlite::Row) -> rusqlite::Result<MediaItem> {
        let metadata_extracted_at: Option<String> = row.get("metadata_extracted_at")?;
        let taken_at: Option<String> = row.get("taken_at")?;
        let thumbnail_updated_at: Option<String> = row.get("thumbnail_updated_at")?;
        let byte_size: Option<i64> = row.get("byte_size")?;

        let crop = match (
            row.get::<_, Option<u32>>("crop_x")?,
            row.get::<_, Option<u32>>("crop_y")?,
            row.get::<_, Option<u32>>("crop_width")?,
            row.get::<_, Option<u32>>("crop_height")?,
        ) {
            (Some(x), Some(y), Some(width), Some(height)) => Some(CropRect {
                x,
                y,
                width,
                height,
            }),
            _ => None,
        };

        Ok(MediaItem {
            id: row.get("id")?,
            folder_id: row.get("folder_id")?,
            file_path: row.get("file_path")?,
            metadata_extracted_at: metadata_extracted_at.as_deref().and_then(parse_datetime),
            mime_type: row.get("mime_type")?,
            byte_size: byte_size.map(|v| v as u64),
            taken_at: taken_at.as_deref().and_then(parse_datetime),
            width: row.get("width")?,
            height: row.get("height")?,
            crop,
            thumbnail_path: row.get("thumbnail_path")?,
            thumbnail_updated_at: thumbnail_updated_at.as_deref().and_then(parse_datetime),
        })
    }

    fn query_folders(conn: &Connection) -> rusqlite::Result<Vec<Folder>> {
        let mut stmt = conn.prepare("SELECT id, path, name FROM folders ORDER BY path")?;
        let folders = stmt
            .query_map([], |row| {
                Ok(Folder {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    fn query_pairs(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<(i64, i64)>> {
        let mut stmt = conn.prepare(sql)?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }
}

impl GalleryStore for SqliteGalleryStore {
    fn create_folder(&self, path: &str, name: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO folders (path, name) VALUES (?1, ?2)",
            params![normalize_folder_path(path), name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_folders(&self) -> Result<Vec<Folder>> {
        let conn = self.lock()?;
        Ok(Self::query_folders(&conn)?)
    }

    fn create_media(&self, folder_id: i64, file_path: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO media (folder_id, file_path) VALUES (?1, ?2)",
            params![folder_id, file_path],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_media(&self, media_id: i64) -> Result<Option<MediaItem>> {
        let conn = self.lock()?;
        let media = conn
            .query_row(
                &format!("SELECT {} FROM media WHERE id = ?1", MEDIA_COLUMNS),
                params![media_id],
                Self::row_to_media,
            )
            .optional()?;
        Ok(media)
    }

    fn create_tag(&self, name: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    fn add_folder_tag(&self, folder_id: i64, tag_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO folder_tags (folder_id, tag_id) VALUES (?1, ?2)",
            params![folder_id, tag_id],
        )?;
        Ok(())
    }

    fn get_media_needing_metadata(&self, limit: usize) -> Result<Vec<MediaItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM media WHERE metadata_extracted_at IS NULL ORDER BY id LIMIT ?1",
            MEDIA_COLUMNS
        ))?;
        let media = stmt
            .query_map(params![limit as i64], Self::row_to_media)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(media)
    }

    fn count_media_needing_metadata(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM media WHERE metadata_extracted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn store_metadata_batch(&self, updates: &[MetadataUpdate]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE media SET metadata_extracted_at = ?1, mime_type = ?2, byte_size = ?3,
                    taken_at = ?4, width = ?5, height = ?6
                 WHERE id = ?7",
            )?;
            for update in updates {
                let metadata = update.metadata.as_ref();
                updated += stmt.execute(params![
                    now,
                    metadata.and_then(|m| m.mime_type.clone()),
                    metadata.map(|m| m.byte_size as i64),
                    metadata.and_then(|m| m.taken_at.as_ref().map(format_datetime)),
                    metadata.and_then(|m| m.width),
                    metadata.and_then(|m| m.height),
                    update.media_id
                ])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    fn get_tag_inheritance_snapshot(&self) -> Result<TagInheritanceSnapshot> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let folders = Self::query_folders(&tx)?;
        let folder_tags = Self::query_pairs(&tx, "SELECT folder_id, tag_id FROM folder_tags")?;
        let media_folders = Self::query_pairs(&tx, "SELECT id, folder_id FROM media")?;
        tx.commit()?;
        Ok(TagInheritanceSnapshot {
            folders,
            folder_tags,
            media_folders,
        })
    }

    fn replace_inherited_tags(&self, bindings: &[InheritedTagBinding]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM media_inherited_tags", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO media_inherited_tags (media_id, tag_id)
                 SELECT ?1, ?2 WHERE EXISTS (SELECT 1 FROM media WHERE id = ?1)",
            )?;
            for binding in bindings {
                stmt.execute(params![binding.media_id, binding.tag_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_inherited_tags(&self, media_id: i64) -> Result<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT tag_id FROM media_inherited_tags WHERE media_id = ?1 ORDER BY tag_id",
        )?;
        let tags = stmt
            .query_map(params![media_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    fn count_inherited_tags(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM media_inherited_tags", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    fn update_thumbnail(
        &self,
        media_id: i64,
        crop: Option<&CropRect>,
        thumbnail_path: &str,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE media SET crop_x = ?1, crop_y = ?2, crop_width = ?3, crop_height = ?4,
                thumbnail_path = ?5, thumbnail_updated_at = ?6
             WHERE id = ?7",
            params![
                crop.map(|c| c.x),
                crop.map(|c| c.y),
                crop.map(|c| c.width),
                crop.map(|c| c.height),
                thumbnail_path,
                format_datetime(&Utc::now()),
                media_id
            ],
        )?;
        Ok(updated == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_codec::ExtractedMetadata;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteGalleryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteGalleryStore::new(temp_dir.path().join("gallery.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_create_folder_normalizes_path() {
        let (store, _temp_dir) = create_test_store();
        store.create_folder("holidays/2024", "2024").unwrap();

        let folders = store.get_folders().unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].path, "/holidays/2024/");
        assert_eq!(folders[0].depth(), 2);
    }

    #[test]
    fn test_duplicate_folder_path_rejected() {
        let (store, _temp_dir) = create_test_store();
        store.create_folder("/a", "a").unwrap();
        assert!(store.create_folder("a/", "again").is_err());
    }

    #[test]
    fn test_metadata_batch_with_sentinel() {
        let (store, _temp_dir) = create_test_store();
        let folder = store.create_folder("/", "root").unwrap();
        let good = store.create_media(folder, "/photos/good.jpg").unwrap();
        let bad = store.create_media(folder, "/photos/bad.jpg").unwrap();
        store.create_media(folder, "/photos/later.jpg").unwrap();

        assert_eq!(store.count_media_needing_metadata().unwrap(), 3);

        let updated = store
            .store_metadata_batch(&[
                MetadataUpdate {
                    media_id: good,
                    metadata: Some(ExtractedMetadata {
                        mime_type: Some("image/jpeg".to_string()),
                        byte_size: 2048,
                        taken_at: None,
                        width: Some(640),
                        height: Some(480),
                    }),
                },
                MetadataUpdate {
                    media_id: bad,
                    metadata: None,
                },
            ])
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(store.count_media_needing_metadata().unwrap(), 1);

        let good_item = store.get_media(good).unwrap().unwrap();
        assert!(good_item.metadata_extracted_at.is_some());
        assert_eq!(good_item.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(good_item.byte_size, Some(2048));
        assert_eq!(good_item.width, Some(640));

        let bad_item = store.get_media(bad).unwrap().unwrap();
        assert!(bad_item.metadata_extracted_at.is_some());
        assert!(bad_item.mime_type.is_none());
        assert!(bad_item.byte_size.is_none());

        let remaining = store.get_media_needing_metadata(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].file_path, "/photos/later.jpg");
    }

    #[test]
    fn test_media_needing_metadata_respects_limit() {
        let (store, _temp_dir) = create_test_store();
        let folder = store.create_folder("/", "root").unwrap();
        for i in 0..5 {
            store
                .create_media(folder, &format!("/photos/{}.jpg", i))
                .unwrap();
        }

        let batch = store.get_media_needing_metadata(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch[0].id < batch[1].id);
    }

    #[test]
    fn test_replace_inherited_tags_replaces_everything() {
        let (store, _temp_dir) = create_test_store();
        let folder = store.create_folder("/", "root").unwrap();
        let media = store.create_media(folder, "/photos/a.jpg").unwrap();
        let tag_a = store.create_tag("a").unwrap();
        let tag_b = store.create_tag("b").unwrap();

        store
            .replace_inherited_tags(&[InheritedTagBinding {
                media_id: media,
                tag_id: tag_a,
            }])
            .unwrap();
        assert_eq!(store.get_inherited_tags(media).unwrap(), vec![tag_a]);

        store
            .replace_inherited_tags(&[InheritedTagBinding {
                media_id: media,
                tag_id: tag_b,
            }])
            .unwrap();
        assert_eq!(store.get_inherited_tags(media).unwrap(), vec![tag_b]);
        assert_eq!(store.count_inherited_tags().unwrap(), 1);
    }

    #[test]
    fn test_failed_replace_keeps_previous_bindings() {
        let (store, _temp_dir) = create_test_store();
        let folder = store.create_folder("/", "root").unwrap();
        let media = store.create_media(folder, "/photos/a.jpg").unwrap();
        let tag = store.create_tag("a").unwrap();
        store
            .replace_inherited_tags(&[InheritedTagBinding {
                media_id: media,
                tag_id: tag,
            }])
            .unwrap();

        // Unknown tag id violates the foreign key and rolls the whole replace back
        let result = store.replace_inherited_tags(&[InheritedTagBinding {
            media_id: media,
            tag_id: 9999,
        }]);
        assert!(result.is_err());
        assert_eq!(store.get_inherited_tags(media).unwrap(), vec![tag]);
    }

    #[test]
    fn test_tag_inheritance_snapshot() {
        let (store, _temp_dir) = create_test_store();
        let root = store.create_folder("/", "root").unwrap();
        let child = store.create_folder("/trips", "trips").unwrap();
        let tag = store.create_tag("travel").unwrap();
        store.add_folder_tag(child, tag).unwrap();
        let media = store.create_media(child, "trips/a.jpg").unwrap();

        let snapshot = store.get_tag_inheritance_snapshot().unwrap();
        let folder_ids: Vec<i64> = snapshot.folders.iter().map(|f| f.id).collect();
        assert_eq!(folder_ids, vec![root, child]);
        assert_eq!(snapshot.folder_tags, vec![(child, tag)]);
        assert_eq!(snapshot.media_folders, vec![(media, child)]);
    }

    #[test]
    fn test_replace_skips_media_deleted_after_snapshot() {
        let (store, _temp_dir) = create_test_store();
        let folder = store.create_folder("/", "root").unwrap();
        let kept = store.create_media(folder, "kept.jpg").unwrap();
        let deleted = store.create_media(folder, "deleted.jpg").unwrap();
        let tag = store.create_tag("a").unwrap();

        store
            .lock()
            .unwrap()
            .execute("DELETE FROM media WHERE id = ?1", params![deleted])
            .unwrap();

        store
            .replace_inherited_tags(&[
                InheritedTagBinding {
                    media_id: kept,
                    tag_id: tag,
                },
                InheritedTagBinding {
                    media_id: deleted,
                    tag_id: tag,
                },
            ])
            .unwrap();
        assert_eq!(store.get_inherited_tags(kept).unwrap(), vec![tag]);
        assert_eq!(store.count_inherited_tags().unwrap(), 1);
    }

    #[test]
    fn test_update_thumbnail() {
        let (store, _temp_dir) = create_test_store();
        let folder = store.create_folder("/", "root").unwrap();
        let media = store.create_media(folder, "/photos/a.jpg").unwrap();
        let crop = CropRect {
            x: 1,
            y: 2,
            width: 30,
            height: 40,
        };

        assert!(store
            .update_thumbnail(media, Some(&crop), "/thumbs/a.jpg")
            .unwrap());
        let item = store.get_media(media).unwrap().unwrap();
        assert_eq!(item.crop, Some(crop));
        assert_eq!(item.thumbnail_path.as_deref(), Some("/thumbs/a.jpg"));
        assert!(item.thumbnail_updated_at.is_some());

        assert!(!store.update_thumbnail(9999, None, "/thumbs/x.jpg").unwrap());
    }
}
