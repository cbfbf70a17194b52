// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `citadel` binary with the mock radio and exercises it
//! over the admin Unix socket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Resolve the path to the compiled `citadel` binary.
pub fn citadel_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("citadel")
}

/// A running `citadel` process that is killed on drop.
pub struct CitadelProcess {
    child: Child,
    socket_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl CitadelProcess {
    /// Spawn citadel with a scratch config: mock radio, temp database,
    /// temp admin socket, quiet logging.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_seeded(&[]).await
    }

    /// Like [`start`], but pre-seeds accounts into the database before the
    /// server boots. Levels are permission-level names ("user", "sysop").
    ///
    /// [`start`]: Self::start
    pub async fn start_seeded(accounts: &[(&str, &str, &str)]) -> anyhow::Result<Self> {
        let binary = citadel_binary();
        anyhow::ensure!(binary.exists(), "citadel binary not found at {}", binary.display());

        let dir = tempfile::tempdir()?;

        if !accounts.is_empty() {
            use citadel::auth::passwords::{generate_salt, hash_password};
            use citadel::auth::permissions::PermissionLevel;
            use citadel::users::UserStatus;

            let db_path = dir.path().join("citadel.db");
            let db = citadel::db::Db::open(&db_path.to_string_lossy()).await?;
            db.init_schema().await?;
            let users = citadel::users::Users::new(
                db.clone(),
                std::sync::Arc::new(citadel::config::Config::default()),
            );
            for (username, password, level) in accounts {
                let level = PermissionLevel::parse(level)
                    .ok_or_else(|| anyhow::anyhow!("bad level {level:?}"))?;
                let salt = generate_salt();
                let hash = hash_password(password, &salt);
                users
                    .create(username, &hash, &salt, username, level, UserStatus::Active)
                    .await?;
            }
        }
        let socket_path = dir.path().join("citadel.sock");
        let config_path = dir.path().join("config.yaml");
        let config = format!(
            "transport:\n\
             \x20 cli:\n\
             \x20   socket: {sock}\n\
             \x20 meshcore:\n\
             \x20   serial_port: mock\n\
             \x20   inter_packet_delay: 0.0\n\
             \x20   ack_timeout: 1\n\
             auth:\n\
             \x20 failed_login_delay: 0\n\
             database:\n\
             \x20 db_path: {db}\n\
             logging:\n\
             \x20 log_level: warn\n\
             \x20 log_file_path: {log}\n",
            sock = socket_path.display(),
            db = dir.path().join("citadel.db").display(),
            log = dir.path().join("citadel.log").display(),
        );
        std::fs::write(&config_path, config)?;

        let child = Command::new(&binary)
            .arg("--config")
            .arg(&config_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, socket_path, _dir: dir })
    }

    /// Wait for the admin socket to accept connections.
    pub async fn wait_ready(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("citadel did not open its socket within {timeout:?}");
            }
            if UnixStream::connect(&self.socket_path).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Open a line-oriented client on the admin socket.
    pub async fn connect(&self) -> anyhow::Result<CliClient> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (read, write) = stream.into_split();
        Ok(CliClient { lines: BufReader::new(read).lines(), write })
    }
}

impl Drop for CitadelProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Line-oriented client for the admin socket.
pub struct CliClient {
    lines: tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>,
    write: tokio::net::unix::OwnedWriteHalf,
}

impl CliClient {
    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.write.write_all(line.as_bytes()).await?;
        self.write.write_all(b"\n").await?;
        Ok(())
    }

    pub async fn read_line(&mut self) -> anyhow::Result<String> {
        let line = tokio::time::timeout(Duration::from_secs(10), self.lines.next_line())
            .await??
            .ok_or_else(|| anyhow::anyhow!("connection closed"))?;
        Ok(line)
    }

    /// Read lines until one contains `needle`, returning it.
    pub async fn read_until(&mut self, needle: &str) -> anyhow::Result<String> {
        for _ in 0..100 {
            let line = self.read_line().await?;
            if line.contains(needle) {
                return Ok(line);
            }
        }
        anyhow::bail!("never saw {needle:?}")
    }

    /// Drive the login workflow to completion.
    pub async fn login(&mut self, username: &str, password: &str) -> anyhow::Result<()> {
        self.read_until("Enter your username:").await?;
        self.send(username).await?;
        self.read_until("Enter your password:").await?;
        self.send(password).await?;
        self.read_until("You are now logged in.").await?;
        Ok(())
    }

    /// Register a fresh account through the `new` shortcut.
    pub async fn register(&mut self, username: &str, password: &str) -> anyhow::Result<()> {
        self.read_until("Enter your username:").await?;
        self.send("new").await?;
        self.read_until("Choose a username to begin registration.").await?;
        self.send(username).await?;
        self.read_until("Choose a display name.").await?;
        self.send(username).await?;
        self.read_until("Choose a password.").await?;
        self.send(password).await?;
        self.read_until("Tell us a bit about yourself.").await?;
        self.send("spec test account").await?;
        self.read_until("Submit registration? (yes/no)").await?;
        self.send("yes").await?;
        self.read_until("submitted for validation").await?;
        Ok(())
    }
}
