use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::google::DynIdentityProvider;
use crate::auth::password::PasswordHasher;
use crate::auth::tokens::TokenService;
use crate::config::Config;
use crate::store::comments::{DynCommentRepository, SqliteCommentRepository};
use crate::store::likes::{DynLikeRepository, SqliteLikeRepository};
use crate::store::posts::{DynPostRepository, SqlitePostRepository};
use crate::store::users::{DynUserRepository, SqliteUserRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub tokens: Arc<TokenService>,
    pub users: DynUserRepository,
    pub posts: DynPostRepository,
    pub likes: DynLikeRepository,
    pub comments: DynCommentRepository,
    /// `None` when no Google client is configured.
    pub identity: Option<DynIdentityProvider>,
}

impl AppState {
    /// Wire the SQLite-backed stores around one pool.
    pub fn new(
        pool: DbPool,
        config: Config,
        tokens: TokenService,
        identity: Option<DynIdentityProvider>,
    ) -> Self {
        let hasher = PasswordHasher::new(config.auth.bcrypt_cost);
        Self {
            tokens: Arc::new(tokens),
            users: Arc::new(SqliteUserRepository::new(pool.clone(), hasher)),
            posts: Arc::new(SqlitePostRepository::new(pool.clone())),
            likes: Arc::new(SqliteLikeRepository::new(pool.clone())),
            comments: Arc::new(SqliteCommentRepository::new(pool)),
            identity,
            config,
        }
    }
}
