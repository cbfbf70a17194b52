// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use crate::config::Config;
use crate::db::Db;
use crate::messages::Messages;
use crate::rooms::Rooms;
use crate::session::SessionManager;
use crate::users::Users;

/// Shared service handles wired once at startup and cloned into every
/// component that needs them.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub db: Db,
    pub sessions: Arc<SessionManager>,
    pub users: Users,
    pub rooms: Rooms,
    pub messages: Messages,
}

impl Services {
    pub fn new(config: Arc<Config>, db: Db, sessions: Arc<SessionManager>) -> Self {
        let users = Users::new(db.clone(), Arc::clone(&config));
        let rooms = Rooms::new(db.clone(), Arc::clone(&config));
        let messages = Messages::new(db.clone());
        Self { config, db, sessions, users, rooms, messages }
    }
}
