//! In-memory stand-ins for Postgres and AlfaCRM, used by unit and integration tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::CrmCredentials;
use crate::crm::{CrmConnector, CrmEntity, CrmError, CrmPage, CrmSource, IndexQuery};
use crate::database::models::{
    Assignment, Game, GameFilter, NewAssignment, NewGame, NewGameResult, NewUser, User, UserUpdate,
    LINKED_LOGIN_PREFIX,
};
use crate::database::{DatabaseError, SchoolStore, StoreConnector};
use crate::sync::normalize_phone;
use crate::types::Role;

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password: String,
}

#[derive(Debug, Clone)]
struct StoredResult {
    game_id: i32,
    score: i32,
    max_score: i32,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<StoredUser>,
    assignments: Vec<Assignment>,
    games: Vec<Game>,
    results: Vec<StoredResult>,
    next_id: i32,
    failing_logins: HashSet<String>,
    refuse_connections: bool,
    opened: usize,
    closed: usize,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared in-memory school database; clones see the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A store handle without going through `connect`
    pub fn store(&self) -> MemoryStore {
        MemoryStore { db: self.clone() }
    }

    pub fn seed_user(&self, login: &str, password: &str, full_name: &str, role: Role, phone: Option<&str>) -> i32 {
        let mut state = self.lock();
        let id = state.next_id();
        state.users.push(StoredUser {
            user: User {
                id,
                login: login.to_string(),
                full_name: Some(full_name.to_string()),
                role: role.as_str().to_string(),
                phone: phone.map(str::to_string),
                lessons_attended: Some(0),
                lessons_missed: Some(0),
                lessons_paid: Some(0),
            },
            password: password.to_string(),
        });
        id
    }

    pub fn seed_game(&self, title: &str, game_type: &str, difficulty: &str, active: bool) -> i32 {
        let mut state = self.lock();
        let id = state.next_id();
        let created_at = base_time() + ChronoDuration::seconds(i64::from(id));
        state.games.push(Game {
            id,
            title: title.to_string(),
            description: Some(String::new()),
            game_type: game_type.to_string(),
            difficulty: Some(difficulty.to_string()),
            target_age_min: None,
            target_age_max: None,
            image_url: None,
            config: Some(json!({})),
            created_by: None,
            created_at: Some(created_at),
            plays_count: Some(0),
            average_score: None,
            is_active: Some(active),
        });
        id
    }

    /// Make `insert_user` fail for this login
    pub fn fail_inserts_for(&self, login: &str) {
        self.lock().failing_logins.insert(login.to_string());
    }

    /// Make every `connect` fail
    pub fn refuse_connections(&self) {
        self.lock().refuse_connections = true;
    }

    pub fn user_by_login(&self, login: &str) -> Option<User> {
        self.lock()
            .users
            .iter()
            .find(|u| u.user.login == login)
            .map(|u| u.user.clone())
    }

    pub fn password_of(&self, login: &str) -> Option<String> {
        self.lock()
            .users
            .iter()
            .find(|u| u.user.login == login)
            .map(|u| u.password.clone())
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn assignment_by_external_id(&self, external_id: &str) -> Option<Assignment> {
        self.lock()
            .assignments
            .iter()
            .find(|a| a.alfacrm_id.as_deref() == Some(external_id))
            .cloned()
    }

    pub fn assignment_count(&self) -> usize {
        self.lock().assignments.len()
    }

    pub fn game(&self, id: i32) -> Option<Game> {
        self.lock().games.iter().find(|g| g.id == id).cloned()
    }

    pub fn result_count(&self) -> usize {
        self.lock().results.len()
    }

    /// `(opened, closed)` store handles handed out by `connect`
    pub fn connections(&self) -> (usize, usize) {
        let state = self.lock();
        (state.opened, state.closed)
    }
}

fn base_time() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[async_trait]
impl StoreConnector for MemoryDb {
    async fn connect(&self, _database_url: &str) -> Result<Box<dyn SchoolStore>, DatabaseError> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(DatabaseError::ConnectTimeout(Duration::from_secs(1)));
        }
        state.opened += 1;
        drop(state);
        Ok(Box::new(self.store()))
    }
}

/// One handle onto a `MemoryDb`
#[derive(Debug, Clone)]
pub struct MemoryStore {
    db: MemoryDb,
}

fn assignment_row(id: i32, assignment: NewAssignment) -> Assignment {
    Assignment {
        id,
        student_id: assignment.student_id,
        teacher_id: assignment.teacher_id,
        title: assignment.title,
        subject: assignment.subject,
        due_date: assignment.due_date,
        due_time: assignment.due_time,
        assignment_type: assignment.assignment_type,
        lesson_type: Some(assignment.lesson_type.as_str().to_string()),
        status: Some(assignment.status.as_str().to_string()),
        completed: assignment.completed,
        description: assignment.description,
        answer: None,
        alfacrm_id: Some(assignment.alfacrm_id),
    }
}

#[async_trait]
impl SchoolStore for MemoryStore {
    async fn find_admin(&mut self, login: &str, password: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self
            .db
            .lock()
            .users
            .iter()
            .find(|u| u.user.login == login && u.password == password && u.user.role == Role::Admin.as_str())
            .map(|u| u.user.clone()))
    }

    async fn list_users(&mut self, role: Role) -> Result<Vec<User>, DatabaseError> {
        let mut users: Vec<User> = self
            .db
            .lock()
            .users
            .iter()
            .filter(|u| u.user.role == role.as_str())
            .map(|u| u.user.clone())
            .collect();
        users.sort_by(|a, b| (a.full_name.is_none(), &a.full_name).cmp(&(b.full_name.is_none(), &b.full_name)));
        Ok(users)
    }

    async fn list_assignments(&mut self) -> Result<Vec<Assignment>, DatabaseError> {
        let mut rows = self.db.lock().assignments.clone();
        rows.sort_by(|a, b| b.due_date.cmp(&a.due_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_games(&mut self, filter: &GameFilter) -> Result<Vec<Game>, DatabaseError> {
        let mut games: Vec<Game> = self
            .db
            .lock()
            .games
            .iter()
            .filter(|g| filter.game_type.as_ref().map_or(true, |t| &g.game_type == t))
            .filter(|g| filter.difficulty.as_ref().map_or(true, |d| g.difficulty.as_ref() == Some(d)))
            .filter(|g| !filter.active_only || g.is_active == Some(true))
            .cloned()
            .collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(games)
    }

    async fn insert_game(&mut self, game: NewGame) -> Result<i32, DatabaseError> {
        let mut state = self.db.lock();
        let id = state.next_id();
        let created_at = base_time() + ChronoDuration::seconds(i64::from(id));
        state.games.push(Game {
            id,
            title: game.title,
            description: Some(game.description),
            game_type: game.game_type,
            difficulty: Some(game.difficulty),
            target_age_min: game.target_age_min,
            target_age_max: game.target_age_max,
            image_url: game.image_url,
            config: Some(game.config),
            created_by: game.created_by,
            created_at: Some(created_at),
            plays_count: Some(0),
            average_score: None,
            is_active: Some(true),
        });
        Ok(id)
    }

    async fn record_game_result(&mut self, result: NewGameResult) -> Result<i32, DatabaseError> {
        let mut state = self.db.lock();
        if !state.games.iter().any(|g| g.id == result.game_id) {
            return Err(DatabaseError::Constraint(format!("game {} does not exist", result.game_id)));
        }
        let id = state.next_id();
        state.results.push(StoredResult {
            game_id: result.game_id,
            score: result.score,
            max_score: result.max_score,
        });

        let percents: Vec<f64> = state
            .results
            .iter()
            .filter(|r| r.game_id == result.game_id && r.max_score > 0)
            .map(|r| f64::from(r.score) / f64::from(r.max_score) * 100.0)
            .collect();
        let average = if percents.is_empty() {
            None
        } else {
            Some(percents.iter().sum::<f64>() / percents.len() as f64)
        };
        if let Some(game) = state.games.iter_mut().find(|g| g.id == result.game_id) {
            game.plays_count = Some(game.plays_count.unwrap_or(0) + 1);
            game.average_score = average;
        }
        Ok(id)
    }

    async fn find_user_by_login(&mut self, login: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self.db.user_by_login(login))
    }

    async fn find_unlinked_by_phone(&mut self, phone: &str, role: Role) -> Result<Option<User>, DatabaseError> {
        Ok(self
            .db
            .lock()
            .users
            .iter()
            .filter(|u| u.user.role == role.as_str() && !u.user.login.starts_with(LINKED_LOGIN_PREFIX))
            .find(|u| u.user.phone.as_deref().map(normalize_phone).as_deref() == Some(phone))
            .map(|u| u.user.clone()))
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<i32, DatabaseError> {
        let mut state = self.db.lock();
        if state.failing_logins.contains(&user.login) {
            return Err(DatabaseError::Constraint(format!("insert rejected for {}", user.login)));
        }
        if state.users.iter().any(|u| u.user.login == user.login) {
            return Err(DatabaseError::Constraint(format!("duplicate login {}", user.login)));
        }
        let id = state.next_id();
        state.users.push(StoredUser {
            user: User {
                id,
                login: user.login,
                full_name: Some(user.full_name),
                role: user.role.as_str().to_string(),
                phone: user.phone,
                lessons_attended: Some(0),
                lessons_missed: Some(0),
                lessons_paid: Some(user.lessons_paid.unwrap_or(0)),
            },
            password: user.password,
        });
        Ok(id)
    }

    async fn update_user(&mut self, id: i32, update: UserUpdate) -> Result<(), DatabaseError> {
        let mut state = self.db.lock();
        let stored = state
            .users
            .iter_mut()
            .find(|u| u.user.id == id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", id)))?;
        stored.user.login = update.login;
        stored.user.full_name = Some(update.full_name);
        stored.user.phone = update.phone;
        if update.lessons_paid.is_some() {
            stored.user.lessons_paid = update.lessons_paid;
        }
        Ok(())
    }

    async fn find_assignment_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Assignment>, DatabaseError> {
        Ok(self.db.assignment_by_external_id(external_id))
    }

    async fn insert_assignment(&mut self, assignment: NewAssignment) -> Result<i32, DatabaseError> {
        let mut state = self.db.lock();
        let id = state.next_id();
        state.assignments.push(assignment_row(id, assignment));
        Ok(id)
    }

    async fn update_assignment(&mut self, id: i32, assignment: NewAssignment) -> Result<(), DatabaseError> {
        let mut state = self.db.lock();
        let row = state
            .assignments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| DatabaseError::NotFound(format!("assignment {}", id)))?;
        let answer = row.answer.take();
        *row = assignment_row(id, assignment);
        row.answer = answer;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        self.db.lock().closed += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Auth(u16),
    Index(CrmEntity, u16),
    Unreachable,
}

/// Scripted AlfaCRM: fixed token, canned records, optional failure
#[derive(Debug, Clone, Default)]
pub struct FakeCrm {
    token: String,
    customers: Vec<Value>,
    teachers: Vec<Value>,
    lessons: Vec<Value>,
    branches: Vec<Value>,
    failure: Option<Failure>,
    requests: Arc<Mutex<Vec<(CrmEntity, Value)>>>,
    opened_with: Arc<Mutex<Vec<CrmCredentials>>>,
}

impl FakeCrm {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            ..Self::default()
        }
    }

    pub fn with_customers(mut self, customers: Vec<Value>) -> Self {
        self.customers = customers;
        self
    }

    pub fn with_teachers(mut self, teachers: Vec<Value>) -> Self {
        self.teachers = teachers;
        self
    }

    pub fn with_lessons(mut self, lessons: Vec<Value>) -> Self {
        self.lessons = lessons;
        self
    }

    pub fn with_branches(mut self, branches: Vec<Value>) -> Self {
        self.branches = branches;
        self
    }

    /// Index calls for `entity` answer with this HTTP status
    pub fn failing_on(mut self, entity: CrmEntity, status: u16) -> Self {
        self.failure = Some(Failure::Index(entity, status));
        self
    }

    pub fn failing_auth(mut self, status: u16) -> Self {
        self.failure = Some(Failure::Auth(status));
        self
    }

    /// Every call fails before reaching the server
    pub fn unreachable(mut self) -> Self {
        self.failure = Some(Failure::Unreachable);
        self
    }

    /// Index calls received so far with their request bodies
    pub fn requests(&self) -> Vec<(CrmEntity, Value)> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Credentials passed to `open`, newest last
    pub fn opened_with(&self) -> Vec<CrmCredentials> {
        self.opened_with.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn records(&self, entity: CrmEntity) -> &[Value] {
        match entity {
            CrmEntity::Customer => &self.customers,
            CrmEntity::Teacher => &self.teachers,
            CrmEntity::Lesson => &self.lessons,
        }
    }
}

fn http_failure(status: u16) -> CrmError {
    CrmError::Http {
        status,
        body: json!({"message": "scripted failure"}).to_string(),
    }
}

fn matches_customer(record: &Value, customer_id: &Value) -> bool {
    match record.get("customer_ids") {
        Some(Value::Array(ids)) => ids.iter().any(|id| id.to_string() == customer_id.to_string()),
        _ => false,
    }
}

#[async_trait]
impl CrmSource for FakeCrm {
    async fn authenticate(&self) -> Result<String, CrmError> {
        match self.failure {
            Some(Failure::Unreachable) => Err(CrmError::Connection("connection refused".to_string())),
            Some(Failure::Auth(status)) => Err(http_failure(status)),
            _ => Ok(self.token.clone()),
        }
    }

    async fn index(&self, token: &str, entity: CrmEntity, query: &IndexQuery) -> Result<CrmPage<Value>, CrmError> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((entity, query.to_body()));
        match self.failure {
            Some(Failure::Unreachable) => return Err(CrmError::Connection("connection refused".to_string())),
            Some(Failure::Index(failing, status)) if failing == entity => return Err(http_failure(status)),
            _ => {}
        }
        if token != self.token {
            return Err(http_failure(401));
        }

        let matching: Vec<Value> = self
            .records(entity)
            .iter()
            .filter(|record| match query.filters.get("customer_id") {
                Some(customer_id) => matches_customer(record, customer_id),
                None => true,
            })
            .cloned()
            .collect();
        let total = matching.len() as i64;
        let items = match query.count {
            Some(count) => matching
                .into_iter()
                .skip(query.page as usize * count as usize)
                .take(count as usize)
                .collect(),
            None => matching,
        };
        Ok(CrmPage { items, total })
    }

    async fn branches(&self, token: &str) -> Result<CrmPage<Value>, CrmError> {
        if self.failure == Some(Failure::Unreachable) {
            return Err(CrmError::Connection("connection refused".to_string()));
        }
        if token != self.token {
            return Err(http_failure(401));
        }
        // AlfaCRM's branch index reply has no `total`
        Ok(CrmPage {
            items: self.branches.clone(),
            total: 0,
        })
    }
}

impl CrmConnector for FakeCrm {
    fn open(&self, credentials: &CrmCredentials) -> Result<Box<dyn CrmSource>, CrmError> {
        self.opened_with
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(credentials.clone());
        Ok(Box::new(self.clone()))
    }
}
