//! Inherited tag rebuild background job.
//!
//! Media inherit every tag attached to the folders containing them, directly
//! or through an ancestor. The derived bindings are recomputed from scratch
//! and swapped in atomically.

use crate::background_jobs::{
    context::JobContext,
    job::{Job, JobError},
};
use crate::gallery_store::{Folder, InheritedTagBinding};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

const RESOURCE_KEY: &str = "inherited-tags";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildInheritedTagsArgs {}

#[derive(Default)]
pub struct RebuildInheritedTagsJob;

impl RebuildInheritedTagsJob {
    pub fn new() -> Self {
        Self
    }
}

impl Job for RebuildInheritedTagsJob {
    type Args = RebuildInheritedTagsArgs;
    const TYPE_NAME: &'static str = "rebuild_inherited_tags";
    const ARGS_TYPE_NAME: &'static str = "rebuild_inherited_tags_args";

    fn description(&self) -> &'static str {
        "Recompute the tags every media item inherits from its folders"
    }

    fn resource_key(&self, _args: &RebuildInheritedTagsArgs) -> Option<String> {
        Some(RESOURCE_KEY.to_string())
    }

    fn run(&self, _args: &RebuildInheritedTagsArgs, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let gallery = ctx.gallery();
        let snapshot = gallery
            .get_tag_inheritance_snapshot()
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        let bindings = compute_inherited_bindings(
            &snapshot.folders,
            &snapshot.folder_tags,
            &snapshot.media_folders,
        );

        if ctx.is_cancelled() {
            info!("Inherited tag rebuild cancelled before writing");
            return Err(JobError::Cancelled);
        }

        gallery
            .replace_inherited_tags(&bindings)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        info!(
            "Rebuilt inherited tags: {} binding(s) across {} folder(s)",
            bindings.len(),
            snapshot.folders.len()
        );
        Ok(())
    }
}

struct FolderTree<'a> {
    folders: Vec<&'a Folder>,
    tags_by_folder: HashMap<i64, Vec<i64>>,
    media_by_folder: HashMap<i64, Vec<i64>>,
}

impl<'a> FolderTree<'a> {
    fn children<'s>(&'s self, parent: &'s Folder) -> impl Iterator<Item = &'a Folder> + 's {
        let depth = parent.depth() + 1;
        self.folders
            .iter()
            .copied()
            .filter(move |f| f.depth() == depth && f.path.starts_with(&parent.path))
    }

    fn visit(
        &self,
        node: &Folder,
        inherited: &BTreeSet<i64>,
        out: &mut BTreeSet<InheritedTagBinding>,
    ) {
        let mut current = inherited.clone();
        if let Some(direct) = self.tags_by_folder.get(&node.id) {
            current.extend(direct.iter().copied());
        }

        if let Some(media_ids) = self.media_by_folder.get(&node.id) {
            for media_id in media_ids {
                for tag_id in &current {
                    out.insert(InheritedTagBinding {
                        media_id: *media_id,
                        tag_id: *tag_id,
                    });
                }
            }
        }

        for child in self.children(node) {
            self.visit(child, &current, out);
        }
    }
}

/// Computes every (media, tag) binding implied by folder tags.
///
/// Starts from the shallowest folders and walks down one level at a time;
/// a child is a folder one level deeper whose path extends its parent's.
/// Each branch works on its own copy of the accumulated tags, so siblings
/// never see each other's tags. Output is sorted and free of duplicates.
pub fn compute_inherited_bindings(
    folders: &[Folder],
    folder_tags: &[(i64, i64)],
    media_folders: &[(i64, i64)],
) -> Vec<InheritedTagBinding> {
    let mut sorted: Vec<&Folder> = folders.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut tags_by_folder: HashMap<i64, Vec<i64>> = HashMap::new();
    for (folder_id, tag_id) in folder_tags {
        tags_by_folder.entry(*folder_id).or_default().push(*tag_id);
    }
    let mut media_by_folder: HashMap<i64, Vec<i64>> = HashMap::new();
    for (media_id, folder_id) in media_folders {
        media_by_folder.entry(*folder_id).or_default().push(*media_id);
    }

    let tree = FolderTree {
        folders: sorted,
        tags_by_folder,
        media_by_folder,
    };

    let mut out = BTreeSet::new();
    let Some(root_depth) = tree.folders.iter().map(|f| f.depth()).min() else {
        return Vec::new();
    };
    let empty = BTreeSet::new();
    for root in tree.folders.iter().filter(|f| f.depth() == root_depth) {
        tree.visit(root, &empty, &mut out);
    }
    out.into_iter().collect()
}
