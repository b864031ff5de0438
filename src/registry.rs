use std::{collections::HashSet, net::Ipv4Addr, str::FromStr, time::Duration};

use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteConnection},
    ConnectOptions, Connection, Executor, FromRow, Sqlite,
};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::peer::{Client, Server};

static MIGRATOR: Migrator = sqlx::migrate!();

/// SQLite extended result code for a violated UNIQUE constraint.
const UNIQUE_VIOLATION: &str = "2067";

/// How long a writer waits for another handle's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("client id {0} already exists on this interface")]
    DuplicateIdentifier(String),
    #[error("client name {0} already in use on this interface")]
    DuplicateName(String),
    #[error("client address {0} already in use on this interface")]
    DuplicateAddress(Ipv4Addr),
    #[error("client {0} not found")]
    NotFound(String),
    #[error("bad connection state")]
    BadConnectionState,
    #[error("stored client {found} does not match lookup key {expected}")]
    IdentityMismatch { expected: String, found: String },
    #[error("invalid stored address {0:?}")]
    InvalidAddress(String),
    #[error("migrate error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl RegistryError {
    /// Rejections the caller can fix by choosing different input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateIdentifier(_)
                | Self::DuplicateName(_)
                | Self::DuplicateAddress(_)
                | Self::NotFound(_)
        )
    }
}

type Result<T> = std::result::Result<T, RegistryError>;

/// Column that uniqueness checks can be run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    Identifier,
    Name,
    Address,
}

impl ClientField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Identifier => "client_uuid",
            Self::Name => "client_name",
            Self::Address => "client_ip",
        }
    }

    fn exists_query(self) -> &'static str {
        match self {
            Self::Identifier => {
                "SELECT 1 FROM clients WHERE client_uuid = ?1 AND server_iface = ?2 LIMIT 1"
            }
            Self::Name => {
                "SELECT 1 FROM clients WHERE client_name = ?1 AND server_iface = ?2 LIMIT 1"
            }
            Self::Address => {
                "SELECT 1 FROM clients WHERE client_ip = ?1 AND server_iface = ?2 LIMIT 1"
            }
        }
    }
}

#[derive(FromRow)]
struct ClientRow {
    client_uuid: String,
    client_name: String,
    client_ip: String,
    client_pub: String,
    client_pri: String,
    server_iface: String,
}

impl ClientRow {
    /// Rebuilds the client and checks the derived id against `expected`.
    fn into_client(self, expected: &str) -> Result<Client> {
        let address = Ipv4Addr::from_str(&self.client_ip)
            .map_err(|_| RegistryError::InvalidAddress(self.client_ip.clone()))?;
        let client = Client::from_parts(
            self.server_iface,
            self.client_name,
            address,
            self.client_pub,
            self.client_pri,
        );
        if client.id != expected {
            return Err(RegistryError::IdentityMismatch {
                expected: expected.to_owned(),
                found: client.id,
            });
        }
        Ok(client)
    }
}

async fn field_taken<'e, E>(executor: E, iface: &str, field: ClientField, value: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query(field.exists_query())
        .bind(value)
        .bind(iface)
        .fetch_optional(executor)
        .await?
        .is_some())
}

async fn write_client(conn: &mut SqliteConnection, client: &Client) -> Result<()> {
    let address = client.address.to_string();
    let checks = [
        (
            ClientField::Identifier,
            client.id.as_str(),
            RegistryError::DuplicateIdentifier(client.id.clone()),
        ),
        (
            ClientField::Name,
            client.name.as_str(),
            RegistryError::DuplicateName(client.name.clone()),
        ),
        (
            ClientField::Address,
            address.as_str(),
            RegistryError::DuplicateAddress(client.address),
        ),
    ];
    for (field, value, err) in checks {
        if field_taken(&mut *conn, &client.server_iface, field, value).await? {
            return Err(err);
        }
    }

    sqlx::query(
        "INSERT INTO clients (client_uuid, client_name, client_ip, client_pub, client_pri, server_iface)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&client.id)
    .bind(&client.name)
    .bind(&address)
    .bind(&client.public_key)
    .bind(&client.private_key)
    .bind(&client.server_iface)
    .execute(&mut *conn)
    .await
    .map_err(|e| unique_violation(&e, client).unwrap_or(RegistryError::Sqlx(e)))?;

    Ok(())
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(conn).await {
        warn!("rollback failed: {e}");
    }
}

/// Maps a write-time UNIQUE violation back to the duplicate it stands for.
fn unique_violation(e: &sqlx::Error, client: &Client) -> Option<RegistryError> {
    let db = e.as_database_error()?;
    if db.code().as_deref() != Some(UNIQUE_VIOLATION) {
        return None;
    }
    let message = db.message();
    if message.contains("client_uuid") {
        Some(RegistryError::DuplicateIdentifier(client.id.clone()))
    } else if message.contains("client_name") {
        Some(RegistryError::DuplicateName(client.name.clone()))
    } else if message.contains("client_ip") {
        Some(RegistryError::DuplicateAddress(client.address))
    } else {
        None
    }
}

/// Persistent client store. One connection, opened on first use.
///
/// Not meant for concurrent use; callers serialize access to one instance.
pub struct Registry {
    options: SqliteConnectOptions,
    conn: Option<SqliteConnection>,
    connected: bool,
}

impl Registry {
    pub fn new(options: SqliteConnectOptions) -> Self {
        Self {
            options,
            conn: None,
            connected: false,
        }
    }

    pub fn open(connstr: &str) -> Result<Self> {
        Ok(Self::new(
            SqliteConnectOptions::from_str(connstr)?
                .create_if_missing(true)
                .busy_timeout(BUSY_TIMEOUT),
        ))
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns the open connection, opening and migrating it on first call.
    pub async fn connection(&mut self) -> Result<&mut SqliteConnection> {
        if !self.connected {
            let mut conn = self.options.connect().await?;
            MIGRATOR.run_direct(&mut conn).await?;
            debug!("client store opened");

            self.conn = Some(conn);
            self.connected = true;
        }

        self.conn.as_mut().ok_or(RegistryError::BadConnectionState)
    }

    pub async fn close(mut self) -> Result<()> {
        self.connected = false;
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn exists_field(
        &mut self,
        server_iface: &str,
        field: ClientField,
        value: &str,
    ) -> Result<bool> {
        let conn = self.connection().await?;
        field_taken(&mut *conn, server_iface, field, value).await
    }

    #[instrument(skip(self))]
    pub async fn assigned_addresses(&mut self, server_iface: &str) -> Result<HashSet<Ipv4Addr>> {
        let conn = self.connection().await?;
        sqlx::query_scalar::<_, String>("SELECT client_ip FROM clients WHERE server_iface = ?1")
            .bind(server_iface)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(|ip| Ipv4Addr::from_str(&ip).map_err(|_| RegistryError::InvalidAddress(ip)))
            .collect()
    }

    /// First free host of the server's subnet in ascending order.
    ///
    /// Nothing is reserved: `insert_client` repeats the address check at
    /// write time, so a concurrent caller may still win the address.
    #[instrument(skip(self, server), fields(iface = %server.iface))]
    pub async fn propose_address(&mut self, server: &Server) -> Result<Option<Ipv4Addr>> {
        let taken = self.assigned_addresses(&server.iface).await?;
        let own = server.vpn_address();

        let proposal = server.hosts().find(|a| *a != own && !taken.contains(a));
        debug!(?proposal, assigned = taken.len(), "address proposal");
        Ok(proposal)
    }

    /// Checks uniqueness and appends one row under the database write lock.
    ///
    /// `BEGIN IMMEDIATE` takes the lock before the checks run, so a second
    /// writer waits for the busy timeout and then sees the committed row.
    #[instrument(skip(self, client), fields(id = %client.id, iface = %client.server_iface))]
    pub async fn insert_client(&mut self, client: &Client) -> Result<()> {
        let conn = self.connection().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match write_client(&mut *conn, client).await {
            Ok(()) => {
                if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    rollback(conn).await;
                    return Err(e.into());
                }
            }
            Err(e) => {
                rollback(conn).await;
                return Err(e);
            }
        }

        debug!("client stored");
        Ok(())
    }

    /// Earliest stored client with this identifier.
    #[instrument(skip(self))]
    pub async fn get_client(&mut self, id: &str) -> Result<Client> {
        let conn = self.connection().await?;
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT client_uuid, client_name, client_ip, client_pub, client_pri, server_iface
            FROM clients
            WHERE client_uuid = ?1
            ORDER BY rowid
            LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.ok_or_else(|| RegistryError::NotFound(id.to_owned()))?
            .into_client(id)
    }

    /// Clients of one interface in insertion order.
    #[instrument(skip(self))]
    pub async fn list_clients(&mut self, server_iface: &str) -> Result<Vec<Client>> {
        let conn = self.connection().await?;
        sqlx::query_as::<_, ClientRow>(
            "SELECT client_uuid, client_name, client_ip, client_pub, client_pri, server_iface
            FROM clients
            WHERE server_iface = ?1
            ORDER BY rowid",
        )
        .bind(server_iface)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| {
            let id = row.client_uuid.clone();
            row.into_client(&id)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Registry {
        Registry::open("sqlite::memory:").unwrap()
    }

    fn client(iface: &str, name: &str, last: u8) -> Client {
        Client::from_parts(
            iface.to_owned(),
            name.to_owned(),
            Ipv4Addr::new(10, 200, 200, last),
            format!("{name}-pub"),
            format!("{name}-pri"),
        )
    }

    #[tokio::test]
    async fn opens_lazily_and_reuses_connection() {
        let mut registry = memory();
        assert!(!registry.is_connected());

        registry.insert_client(&client("wg0", "alice", 2)).await.unwrap();
        assert!(registry.is_connected());

        // a second open would be a fresh empty in-memory database
        assert!(registry
            .exists_field("wg0", ClientField::Name, "alice")
            .await
            .unwrap());
        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn lost_connection_is_reported() {
        let mut registry = memory();
        registry.connected = true;

        let err = registry
            .exists_field("wg0", ClientField::Name, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BadConnectionState));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn duplicate_checks_run_in_order() {
        let mut registry = memory();
        let alice = client("wg0", "alice", 2);
        registry.insert_client(&alice).await.unwrap();

        let err = registry.insert_client(&alice).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateIdentifier(id) if id == "99bde5"));

        // same name, other address: new id, name clash
        let err = registry
            .insert_client(&client("wg0", "alice", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "alice"));

        let err = registry
            .insert_client(&client("wg0", "bob", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAddress(a) if a == Ipv4Addr::new(10, 200, 200, 2)));
        assert!(err.is_recoverable());

        assert_eq!(registry.list_clients("wg0").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_time_violation_maps_to_duplicate() {
        let mut registry = memory();
        let alice = client("wg0", "alice", 2);
        registry.insert_client(&alice).await.unwrap();

        let conn = registry.connection().await.unwrap();
        let e = sqlx::query(
            "INSERT INTO clients VALUES ('zzzzzz', 'mallory', '10.200.200.2', 'p', 'q', 'wg0')",
        )
        .execute(&mut *conn)
        .await
        .unwrap_err();

        let mallory = client("wg0", "mallory", 2);
        assert!(matches!(
            unique_violation(&e, &mallory),
            Some(RegistryError::DuplicateAddress(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_identifier_is_fatal() {
        let mut registry = memory();
        let conn = registry.connection().await.unwrap();
        sqlx::query(
            "INSERT INTO clients VALUES ('abcdef', 'alice', '10.200.200.2', 'p', 'q', 'wg0')",
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        let err = registry.get_client("abcdef").await.unwrap_err();
        assert!(matches!(err, RegistryError::IdentityMismatch { .. }));
        assert!(registry.list_clients("wg0").await.is_err());
    }

    #[tokio::test]
    async fn missing_client() {
        let mut registry = memory();
        let err = registry.get_client("000000").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(id) if id == "000000"));
    }

    #[test]
    fn field_columns() {
        assert_eq!(ClientField::Identifier.column(), Client::FIELDS[0]);
        assert_eq!(ClientField::Name.column(), Client::FIELDS[1]);
        assert_eq!(ClientField::Address.column(), Client::FIELDS[2]);
    }
}
