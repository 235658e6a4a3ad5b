use super::scope::JobScope;
use crate::gallery_store::GalleryStore;
use crate::media_codec::MediaCodec;
use tokio_util::sync::CancellationToken;

/// Context handed to a job body for one execution.
///
/// Owns the execution's scope: collaborators are dropped together with the
/// context once the body returns.
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Ledger row of this attempt.
    pub ledger_id: i64,

    scope: JobScope,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, ledger_id: i64, scope: JobScope) -> Self {
        Self {
            cancellation_token,
            ledger_id,
            scope,
        }
    }

    /// Check if cancellation has been requested.
    ///
    /// Jobs should periodically check this during long-running operations
    /// and return early with `JobError::Cancelled` if true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn gallery(&self) -> &dyn GalleryStore {
        self.scope.gallery.as_ref()
    }

    pub fn codec(&self) -> &dyn MediaCodec {
        self.scope.codec.as_ref()
    }
}
