//! SQLite schema for the gallery database.
//!
//! Only the tables the background jobs read or write are defined here.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Folders, media, tags
// =============================================================================

const FOLDERS_TABLE_V1: Table = Table {
    name: "folders",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("path", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const MEDIA_TABLE_V1: Table = Table {
    name: "media",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!(
            "folder_id",
            &SqlType::Integer,
            non_null = true,
            references = Some(("folders", "id"))
        ),
        sqlite_column!("file_path", &SqlType::Text, non_null = true),
        sqlite_column!("metadata_extracted_at", &SqlType::Text),
        sqlite_column!("mime_type", &SqlType::Text),
        sqlite_column!("byte_size", &SqlType::Integer),
        sqlite_column!("taken_at", &SqlType::Text),
        sqlite_column!("width", &SqlType::Integer),
        sqlite_column!("height", &SqlType::Integer),
    ],
    indices: &[
        ("idx_media_folder", "folder_id"),
        ("idx_media_metadata_extracted", "metadata_extracted_at"),
    ],
    unique_constraints: &[],
};

const TAGS_TABLE_V1: Table = Table {
    name: "tags",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const FOLDER_TAGS_TABLE_V1: Table = Table {
    name: "folder_tags",
    columns: &[
        sqlite_column!(
            "folder_id",
            &SqlType::Integer,
            non_null = true,
            references = Some(("folders", "id"))
        ),
        sqlite_column!(
            "tag_id",
            &SqlType::Integer,
            non_null = true,
            references = Some(("tags", "id"))
        ),
    ],
    indices: &[],
    unique_constraints: &[&["folder_id", "tag_id"]],
};

// =============================================================================
// Version 2 - Thumbnails and inherited tags
// =============================================================================

const MEDIA_TABLE_V2: Table = Table {
    name: "media",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!(
            "folder_id",
            &SqlType::Integer,
            non_null = true,
            references = Some(("folders", "id"))
        ),
        sqlite_column!("file_path", &SqlType::Text, non_null = true),
        sqlite_column!("metadata_extracted_at", &SqlType::Text),
        sqlite_column!("mime_type", &SqlType::Text),
        sqlite_column!("byte_size", &SqlType::Integer),
        sqlite_column!("taken_at", &SqlType::Text),
        sqlite_column!("width", &SqlType::Integer),
        sqlite_column!("height", &SqlType::Integer),
        sqlite_column!("crop_x", &SqlType::Integer),
        sqlite_column!("crop_y", &SqlType::Integer),
        sqlite_column!("crop_width", &SqlType::Integer),
        sqlite_column!("crop_height", &SqlType::Integer),
        sqlite_column!("thumbnail_path", &SqlType::Text),
        sqlite_column!("thumbnail_updated_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_media_folder", "folder_id"),
        ("idx_media_metadata_extracted", "metadata_extracted_at"),
    ],
    unique_constraints: &[],
};

/// Tags derived from the folder hierarchy. Wholesale replaced on rebuild.
const MEDIA_INHERITED_TAGS_TABLE_V2: Table = Table {
    name: "media_inherited_tags",
    columns: &[
        sqlite_column!(
            "media_id",
            &SqlType::Integer,
            non_null = true,
            references = Some(("media", "id"))
        ),
        sqlite_column!(
            "tag_id",
            &SqlType::Integer,
            non_null = true,
            references = Some(("tags", "id"))
        ),
    ],
    indices: &[("idx_media_inherited_tags_tag", "tag_id")],
    unique_constraints: &[&["media_id", "tag_id"]],
};

/// Migration from version 1 to version 2: thumbnail columns and inherited tags
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    for column in [
        "crop_x INTEGER",
        "crop_y INTEGER",
        "crop_width INTEGER",
        "crop_height INTEGER",
        "thumbnail_path TEXT",
        "thumbnail_updated_at TEXT",
    ] {
        conn.execute(&format!("ALTER TABLE media ADD COLUMN {}", column), [])?;
    }
    MEDIA_INHERITED_TAGS_TABLE_V2.create(conn)?;
    Ok(())
}

pub const GALLERY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            FOLDERS_TABLE_V1,
            MEDIA_TABLE_V1,
            TAGS_TABLE_V1,
            FOLDER_TAGS_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            FOLDERS_TABLE_V1,
            MEDIA_TABLE_V2,
            TAGS_TABLE_V1,
            FOLDER_TAGS_TABLE_V1,
            MEDIA_INHERITED_TAGS_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
