use std::sync::Arc;

use hyper::{header, HeaderMap, header::HeaderValue};
use secrecy::ExposeSecret;
use tokio_postgres::{Client, NoTls};

use crate::{
    api,
    auth::{Identity, JwtContext, RequestContext},
    config::Config,
    events::EventBus,
    prelude::*,
    db::{types::Key, Db},
};
use super::super::{DbConfig, TlsMode};


/// The config used for all DB tests. Its database has to exist and the user
/// must be allowed to create new databases.
const DEV_CONFIG: &str = "util/dev-config/config.toml";

async fn conn(config: &DbConfig) -> Result<Client> {
    let (client, connection) = tokio_postgres::config::Config::new()
        .user(&config.user)
        .password(config.password.expose_secret())
        .dbname(&config.database)
        .host(&config.host)
        .port(config.port)
        .application_name("Postboard DB tests")
        .connect(NoTls)
        .await
        .context("could not connect to DB in test")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            panic!("PG connection error: {e}");
        }
    });

    Ok(client)
}

/// A temporary, migrated DB used for a single unit test. Is removed on drop.
///
/// Be sure to use the multi threaded Tokio runtime or else `drop` will panic.
pub(super) struct TestDb {
    db: Option<Db>,
    controller: Client,
    db_name: String,
    config: Arc<Config>,
    jwt: Arc<JwtContext>,
}

impl TestDb {
    /// Creates a new temporary database with connection data from the dev
    /// config and runs all migrations on it.
    pub(super) async fn new() -> Result<Self> {
        let config = Config::load_from(DEV_CONFIG).context("failed to load config")?;
        let jwt = JwtContext::new(&config.auth)?;

        // Create connection to original database and create a new temporary one.
        let controller = conn(&config.db).await?;
        let db_name = format!("postboard_test_{}", rand::random::<u64>());
        controller.execute(&format!("create database {db_name}"), &[]).await
            .context("failed to create temporary test DB")?;

        let db_config = DbConfig {
            database: db_name.clone(),
            tls_mode: TlsMode::Off,
            server_cert: None,
            ..config.db.clone()
        };
        let pool = crate::db::create_pool(&db_config).await?;
        crate::db::migrate(&mut *pool.get().await?).await
            .context("failed to run migrations on test DB")?;

        Ok(Self {
            db: Some(Db::new(pool)),
            controller,
            db_name,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
        })
    }

    pub(super) fn db(&self) -> &Db {
        self.db.as_ref().unwrap()
    }

    /// An API context as if `identity` sent an HTTP request to this DB. Users
    /// get a freshly issued token in the `Authorization` header.
    pub(super) fn context(&self, identity: Identity) -> api::Context {
        let mut headers = HeaderMap::new();
        if let Identity::User(user) = identity {
            let token = self.jwt.issue(user).unwrap();
            let value = HeaderValue::from_str(&format!("Bearer {token}")).unwrap();
            headers.insert(header::AUTHORIZATION, value);
        }

        api::Context {
            db: self.db().clone(),
            request: RequestContext::Http(headers),
            jwt: self.jwt.clone(),
            events: EventBus::new(),
            config: self.config.clone(),
        }
    }

    pub(super) async fn add_user(&self, name: &str, email: &str) -> Result<Key> {
        let row = self.db().query_opt(
            "insert into users (name, email, password) values ($1, $2, 'x') returning id",
            &[&name, &email],
        ).await?;
        Ok(row.unwrap().get(0))
    }

    pub(super) async fn add_post(
        &self,
        author: Key,
        title: &str,
        body: &str,
        published: bool,
    ) -> Result<Key> {
        let row = self.db().query_opt(
            "insert into posts (title, body, published, author) values ($1, $2, $3, $4) \
                returning id",
            &[&title, &body, &published, &author],
        ).await?;
        Ok(row.unwrap().get(0))
    }

    pub(super) async fn add_comment(&self, author: Key, post: Key, text: &str) -> Result<Key> {
        let row = self.db().query_opt(
            "insert into comments (text, author, post) values ($1, $2, $3) returning id",
            &[&text, &author, &post],
        ).await?;
        Ok(row.unwrap().get(0))
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        // Since there is no "async drop" in Rust yet, this is a bit annoying.
        // First we drop the pool to close all connections to the temporary
        // database. Then we drop the database from within the runtime.
        //
        // This code requires the multi threaded Tokio runtime! :(
        drop(self.db.take());
        let sql = format!("drop database {} with (force)", self.db_name);
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                self.controller.execute(&sql, &[])
                    .await
                    .expect("failed to drop temporary test DB");
            });
        });
    }
}
