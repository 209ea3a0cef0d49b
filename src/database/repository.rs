use async_trait::async_trait;
use sqlx::{Connection, PgConnection, Postgres, QueryBuilder};

use crate::database::manager::DatabaseError;
use crate::database::models::{
    Assignment, Game, GameFilter, NewAssignment, NewGame, NewGameResult, NewUser, User, UserUpdate,
    LINKED_LOGIN_PREFIX,
};
use crate::types::Role;

/// Every statement the handlers and the CRM sync run against the school database
#[async_trait]
pub trait SchoolStore: Send {
    /// Exact login + password match restricted to admins
    async fn find_admin(&mut self, login: &str, password: &str) -> Result<Option<User>, DatabaseError>;

    /// All users with the role, ordered by full name
    async fn list_users(&mut self, role: Role) -> Result<Vec<User>, DatabaseError>;

    async fn list_assignments(&mut self) -> Result<Vec<Assignment>, DatabaseError>;

    async fn list_games(&mut self, filter: &GameFilter) -> Result<Vec<Game>, DatabaseError>;

    async fn insert_game(&mut self, game: NewGame) -> Result<i32, DatabaseError>;

    /// Insert a result, bump `plays_count` and recompute `average_score` from all stored results
    async fn record_game_result(&mut self, result: NewGameResult) -> Result<i32, DatabaseError>;

    async fn find_user_by_login(&mut self, login: &str) -> Result<Option<User>, DatabaseError>;

    /// Phone match on digits only, among rows no CRM record owns yet
    async fn find_unlinked_by_phone(&mut self, phone: &str, role: Role) -> Result<Option<User>, DatabaseError>;

    async fn insert_user(&mut self, user: NewUser) -> Result<i32, DatabaseError>;

    async fn update_user(&mut self, id: i32, update: UserUpdate) -> Result<(), DatabaseError>;

    async fn find_assignment_by_external_id(&mut self, external_id: &str)
        -> Result<Option<Assignment>, DatabaseError>;

    async fn insert_assignment(&mut self, assignment: NewAssignment) -> Result<i32, DatabaseError>;

    async fn update_assignment(&mut self, id: i32, assignment: NewAssignment) -> Result<(), DatabaseError>;

    /// Release the underlying connection
    async fn close(self: Box<Self>) -> Result<(), DatabaseError>;
}

const USER_COLUMNS: &str =
    "id, login, full_name, role, phone, lessons_attended, lessons_missed, lessons_paid";

const ASSIGNMENT_COLUMNS: &str = "id, student_id, teacher_id, title, subject, due_date, due_time, \
     \"type\" AS assignment_type, lesson_type, status, COALESCE(completed, false) AS completed, \
     description, answer, alfacrm_id";

const GAME_COLUMNS: &str = "id, title, description, game_type, difficulty, target_age_min, \
     target_age_max, image_url, config, created_by, created_at, plays_count, \
     average_score::float8 AS average_score, is_active";

/// `SchoolStore` over one Postgres connection; table names are qualified with the schema
pub struct PgStore {
    conn: PgConnection,
    schema: String,
}

impl PgStore {
    pub fn new(conn: PgConnection, schema: String) -> Self {
        Self { conn, schema }
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }
}

#[async_trait]
impl SchoolStore for PgStore {
    async fn find_admin(&mut self, login: &str, password: &str) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE login = $1 AND password = $2 AND role = 'admin' LIMIT 1",
            USER_COLUMNS,
            self.table("users")
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(login)
            .bind(password)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(user)
    }

    async fn list_users(&mut self, role: Role) -> Result<Vec<User>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE role = $1 ORDER BY full_name",
            USER_COLUMNS,
            self.table("users")
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(role.as_str())
            .fetch_all(&mut self.conn)
            .await?;
        Ok(users)
    }

    async fn list_assignments(&mut self) -> Result<Vec<Assignment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY due_date DESC NULLS LAST, id",
            ASSIGNMENT_COLUMNS,
            self.table("assignments")
        );
        let rows = sqlx::query_as::<_, Assignment>(&sql)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows)
    }

    async fn list_games(&mut self, filter: &GameFilter) -> Result<Vec<Game>, DatabaseError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE 1=1",
            GAME_COLUMNS,
            self.table("games")
        ));
        if let Some(game_type) = &filter.game_type {
            query.push(" AND game_type = ").push_bind(game_type.clone());
        }
        if let Some(difficulty) = &filter.difficulty {
            query.push(" AND difficulty = ").push_bind(difficulty.clone());
        }
        if filter.active_only {
            query.push(" AND is_active = true");
        }
        query.push(" ORDER BY created_at DESC");

        let games = query
            .build_query_as::<Game>()
            .fetch_all(&mut self.conn)
            .await?;
        Ok(games)
    }

    async fn insert_game(&mut self, game: NewGame) -> Result<i32, DatabaseError> {
        let sql = format!(
            "INSERT INTO {} (title, description, game_type, difficulty, target_age_min, target_age_max, \
             image_url, config, created_by) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
            self.table("games")
        );
        let (id,): (i32,) = sqlx::query_as(&sql)
            .bind(game.title)
            .bind(game.description)
            .bind(game.game_type)
            .bind(game.difficulty)
            .bind(game.target_age_min)
            .bind(game.target_age_max)
            .bind(game.image_url)
            .bind(sqlx::types::Json(game.config))
            .bind(game.created_by)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(id)
    }

    async fn record_game_result(&mut self, result: NewGameResult) -> Result<i32, DatabaseError> {
        let results_table = self.table("game_results");
        let games_table = self.table("games");
        let mut tx = self.conn.begin().await?;

        let insert = format!(
            "INSERT INTO {} (game_id, student_id, score, max_score, time_spent, details) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            results_table
        );
        let (result_id,): (i32,) = sqlx::query_as(&insert)
            .bind(result.game_id)
            .bind(result.student_id)
            .bind(result.score)
            .bind(result.max_score)
            .bind(result.time_spent)
            .bind(sqlx::types::Json(result.details))
            .fetch_one(&mut *tx)
            .await?;

        let update = format!(
            "UPDATE {games} SET plays_count = COALESCE(plays_count, 0) + 1, average_score = ( \
                 SELECT AVG(CAST(score AS DOUBLE PRECISION) / max_score * 100) \
                 FROM {results} WHERE game_id = $1 AND max_score > 0 \
             ) WHERE id = $1",
            games = games_table,
            results = results_table
        );
        let updated = sqlx::query(&update)
            .bind(result.game_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            tracing::warn!("Result {} recorded for unknown game {}", result_id, result.game_id);
        }

        tx.commit().await?;
        Ok(result_id)
    }

    async fn find_user_by_login(&mut self, login: &str) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {} FROM {} WHERE login = $1 LIMIT 1", USER_COLUMNS, self.table("users"));
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(login)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(user)
    }

    async fn find_unlinked_by_phone(&mut self, phone: &str, role: Role) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE regexp_replace(COALESCE(phone, ''), '[^0-9]', '', 'g') = $1 \
             AND role = $2 AND NOT starts_with(login, $3) ORDER BY id LIMIT 1",
            USER_COLUMNS,
            self.table("users")
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(phone)
            .bind(role.as_str())
            .bind(LINKED_LOGIN_PREFIX)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(user)
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<i32, DatabaseError> {
        let sql = format!(
            "INSERT INTO {} (login, password, full_name, role, phone, lessons_paid) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            self.table("users")
        );
        let (id,): (i32,) = sqlx::query_as(&sql)
            .bind(user.login)
            .bind(user.password)
            .bind(user.full_name)
            .bind(user.role.as_str())
            .bind(user.phone)
            .bind(user.lessons_paid)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(id)
    }

    async fn update_user(&mut self, id: i32, update: UserUpdate) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE {} SET login = $2, full_name = $3, phone = $4, \
             lessons_paid = COALESCE($5, lessons_paid) WHERE id = $1",
            self.table("users")
        );
        let done = sqlx::query(&sql)
            .bind(id)
            .bind(update.login)
            .bind(update.full_name)
            .bind(update.phone)
            .bind(update.lessons_paid)
            .execute(&mut self.conn)
            .await?;
        if done.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    async fn find_assignment_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Assignment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE alfacrm_id = $1 LIMIT 1",
            ASSIGNMENT_COLUMNS,
            self.table("assignments")
        );
        let row = sqlx::query_as::<_, Assignment>(&sql)
            .bind(external_id)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(row)
    }

    async fn insert_assignment(&mut self, assignment: NewAssignment) -> Result<i32, DatabaseError> {
        let sql = format!(
            "INSERT INTO {} (student_id, teacher_id, title, subject, due_date, due_time, \"type\", \
             lesson_type, status, completed, description, alfacrm_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING id",
            self.table("assignments")
        );
        let (id,): (i32,) = sqlx::query_as(&sql)
            .bind(assignment.student_id)
            .bind(assignment.teacher_id)
            .bind(assignment.title)
            .bind(assignment.subject)
            .bind(assignment.due_date)
            .bind(assignment.due_time)
            .bind(assignment.assignment_type)
            .bind(assignment.lesson_type.as_str())
            .bind(assignment.status.as_str())
            .bind(assignment.completed)
            .bind(assignment.description)
            .bind(assignment.alfacrm_id)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(id)
    }

    async fn update_assignment(&mut self, id: i32, assignment: NewAssignment) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE {} SET student_id = $2, teacher_id = $3, title = $4, subject = $5, due_date = $6, \
             due_time = $7, \"type\" = $8, lesson_type = $9, status = $10, completed = $11, \
             description = $12 WHERE id = $1",
            self.table("assignments")
        );
        let done = sqlx::query(&sql)
            .bind(id)
            .bind(assignment.student_id)
            .bind(assignment.teacher_id)
            .bind(assignment.title)
            .bind(assignment.subject)
            .bind(assignment.due_date)
            .bind(assignment.due_time)
            .bind(assignment.assignment_type)
            .bind(assignment.lesson_type.as_str())
            .bind(assignment.status.as_str())
            .bind(assignment.completed)
            .bind(assignment.description)
            .execute(&mut self.conn)
            .await?;
        if done.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("assignment {}", id)));
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        let store = *self;
        store.conn.close().await?;
        Ok(())
    }
}
