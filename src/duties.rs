use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use hypertext::{prelude::*, Raw};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::cards::{CardController, CardEvent, CardGroupPair};
use crate::config::get_timezone;
use crate::countdown::{spawn_ticker, Countdown, CountdownError, SystemClock, TIMESTAMP_FORMAT};
use crate::db::{self, DbPool};
use crate::duty::Duty;
use crate::errors::DutyError;
use crate::manager::DutyManager;
use crate::users::{User, UserPayload};

/// Timestamp format of the `now` field in API envelopes.
const API_NOW_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

// Live countdowns, one per duty, shared with their ticker tasks
type CountdownMap = Arc<Mutex<HashMap<i64, Arc<Mutex<Countdown>>>>>;
static COUNTDOWNS: OnceLock<CountdownMap> = OnceLock::new();

fn countdowns() -> &'static CountdownMap {
    COUNTDOWNS.get_or_init(|| Arc::new(Mutex::new(HashMap::new())))
}

// Card view state, one controller per duty
type CardBoardMap = Arc<Mutex<HashMap<i64, CardController>>>;
static CARD_BOARDS: OnceLock<CardBoardMap> = OnceLock::new();

fn card_boards() -> &'static CardBoardMap {
    CARD_BOARDS.get_or_init(|| Arc::new(Mutex::new(HashMap::new())))
}

fn active_region(slot: usize) -> String {
    format!("task{}-active", slot)
}

fn completed_region(slot: usize) -> String {
    format!("task{}-completed", slot)
}

fn fresh_board() -> CardController {
    CardController::bind(
        (1..=3)
            .map(|slot| CardGroupPair::new(active_region(slot), completed_region(slot)))
            .collect(),
    )
}

pub fn router() -> Router<DbPool> {
    Router::new()
        .route("/page", get(duty_page))
        .route("/start", post(start_duty_form))
        .route("/api/create", post(duty_api_start))
        .route("/api/details", get(duty_api_detail))
        .route("/{id}/clock", get(duty_clock))
        .route("/{id}/cards/{region}/toggle", post(card_toggle))
        .route("/{id}/cards/{region}/submit", post(card_submit))
}

// ============================================================================
// API envelope
// ============================================================================

#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
    now: String,
}

impl ApiResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
            now: api_now(),
        }
    }

    fn success(message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: Some(payload),
            now: api_now(),
        }
    }
}

fn api_now() -> String {
    Utc::now()
        .with_timezone(&get_timezone())
        .format(API_NOW_FORMAT)
        .to_string()
}

/// Duty fields exposed through the API.
#[derive(Serialize)]
struct DutyPayload {
    duty_start: String,
    duty_end: String,
    task1_start: String,
    task1_end: String,
    task2_start: String,
    task2_end: String,
    task3_start: String,
    task3_end: String,
    last_active: Option<String>,
    debtee: Option<UserPayload>,
}

impl DutyPayload {
    async fn from_duty(pool: &DbPool, duty: &Duty) -> Self {
        let debtee = match duty.debtee_id {
            Some(id) => db::get_user(pool, id).await.ok().flatten(),
            None => None,
        };

        Self {
            duty_start: duty_timestamp(duty.duty_start),
            duty_end: duty_timestamp(duty.duty_end),
            task1_start: duty_timestamp(duty.task1_start),
            task1_end: duty_timestamp(duty.task1_end),
            task2_start: duty_timestamp(duty.task2_start),
            task2_end: duty_timestamp(duty.task2_end),
            task3_start: duty_timestamp(duty.task3_start),
            task3_end: duty_timestamp(duty.task3_end),
            last_active: duty.last_active.map(duty_timestamp),
            debtee: debtee.as_ref().map(UserPayload::from),
        }
    }
}

/// Render an instant in the duty timestamp format, in the application
/// timezone. These strings are what countdowns are built from.
fn duty_timestamp(instant: chrono::DateTime<Utc>) -> String {
    instant
        .with_timezone(&get_timezone())
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

// ============================================================================
// Countdown wiring
// ============================================================================

/// Fetch the live countdown for a duty, starting one (and its ticker) the
/// first time the duty's clock is asked for.
fn countdown_for(duty: &Duty) -> Result<Arc<Mutex<Countdown>>, CountdownError> {
    let mut map = countdowns().lock().unwrap();
    if let Some(existing) = map.get(&duty.id) {
        return Ok(existing.clone());
    }

    let server_now = duty_timestamp(Utc::now());
    let duty_end = duty_timestamp(duty.duty_end);
    let countdown = Arc::new(Mutex::new(Countdown::new(
        &server_now,
        &duty_end,
        &SystemClock,
    )?));

    map.insert(duty.id, countdown.clone());
    spawn_ticker(countdown.clone());
    tracing::debug!(duty_id = duty.id, "countdown started");
    Ok(countdown)
}

// GET /duty/:id/clock - Current countdown text for the display region
async fn duty_clock(State(pool): State<DbPool>, Path(id): Path<i64>) -> Html<String> {
    let duty = match db::get_duty(&pool, id).await {
        Ok(Some(duty)) => duty,
        Ok(None) => return Html(format!("Duty {} not found", id)),
        Err(e) => {
            tracing::error!(duty_id = id, "failed to load duty: {}", e);
            return Html("--:--:--".to_string());
        }
    };

    match countdown_for(&duty) {
        Ok(countdown) => {
            let countdown = countdown.lock().unwrap();
            Html(countdown.display().to_string())
        }
        Err(e) => {
            tracing::error!(duty_id = id, "countdown rejected duty timestamps: {}", e);
            Html("--:--:--".to_string())
        }
    }
}

// ============================================================================
// Pages
// ============================================================================

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    matric: Option<String>,
}

// GET /duty/page - On-duty page for a duty holder, get-started otherwise
pub async fn duty_page(State(pool): State<DbPool>, Query(query): Query<PageQuery>) -> Html<String> {
    let Some(matric) = query.matric else {
        return Html(render_whoami_page(&pool).await);
    };

    let Ok(Some(user)) = db::get_user_by_matric(&pool, &matric).await else {
        return Html(format!(
            "<!DOCTYPE html><html><head><title>Not Found</title></head><body>\
             <h1>No member with matric no. '{}'</h1><a href=\"/duty/page\">Back</a></body></html>",
            matric
        ));
    };

    let manager = DutyManager::load(pool.clone());
    if let Err(e) = manager.remove_finished_duties().await {
        tracing::error!("failed to sweep finished duties: {}", e);
    }

    match manager.get_duties_of(&user).await {
        Ok(duties) if !duties.is_empty() => Html(render_onduty_page(&user, &duties[0])),
        Ok(_) => Html(render_getstarted_page(&user, None)),
        Err(e) => {
            tracing::error!("failed to load duties of {}: {}", user.matric, e);
            Html(render_getstarted_page(&user, Some(&e.to_string())))
        }
    }
}

#[derive(Deserialize)]
struct StartDutyForm {
    matric: String,
    #[serde(default)]
    debtee_matric: Option<String>,
}

// POST /duty/start - Start a duty from the get-started form
async fn start_duty_form(
    State(pool): State<DbPool>,
    Form(form): Form<StartDutyForm>,
) -> Html<String> {
    let Ok(Some(user)) = db::get_user_by_matric(&pool, &form.matric).await else {
        return Html(format!(
            "<!DOCTYPE html><html><head><title>Not Found</title></head><body>\
             <h1>No member with matric no. '{}'</h1></body></html>",
            form.matric
        ));
    };

    let manager = DutyManager::load(pool.clone());
    if let Err(e) = manager.remove_finished_duties().await {
        tracing::error!("failed to sweep finished duties: {}", e);
    }

    let debtee_matric = form
        .debtee_matric
        .as_deref()
        .map(str::trim)
        .filter(|matric| !matric.is_empty());

    let debtee = match debtee_matric {
        Some(matric) => match db::get_user_by_matric(&pool, matric).await {
            Ok(Some(debtee)) if debtee.id == user.id => {
                return Html(render_getstarted_page(
                    &user,
                    Some(
                        "Cannot specify yourself as in-debt friend. \
                         Do you mistype friend matric no. with yours?",
                    ),
                ));
            }
            Ok(Some(debtee)) => Some(debtee),
            _ => {
                return Html(render_getstarted_page(
                    &user,
                    Some(&format!("No member with matric no. '{}'", matric)),
                ));
            }
        },
        None => None,
    };

    match manager.start_duty(&user, debtee.as_ref()).await {
        Ok(duty) => Html(render_onduty_page(&user, &duty)),
        Err(e) => Html(render_getstarted_page(&user, Some(&e.to_string()))),
    }
}

// ============================================================================
// API endpoints
// ============================================================================

#[derive(Deserialize)]
struct DebteeParams {
    matric: String,
}

#[derive(Deserialize)]
struct StartDutyRequest {
    matric: String,
    #[serde(default)]
    debtee: Option<DebteeParams>,
}

// POST /duty/api/create - Start a duty
async fn duty_api_start(
    State(pool): State<DbPool>,
    Json(request): Json<StartDutyRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let manager = DutyManager::load(pool.clone());
    if let Err(e) = manager.remove_finished_duties().await {
        tracing::error!("failed to sweep finished duties: {}", e);
    }

    let user = match db::get_user_by_matric(&pool, &request.matric).await {
        Ok(Some(user)) => user,
        _ => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::failure(format!(
                    "No member with matric no. '{}'",
                    request.matric
                ))),
            );
        }
    };

    let debtee = match &request.debtee {
        Some(params) => match db::get_user_by_matric(&pool, &params.matric).await {
            Ok(Some(debtee)) if debtee.id == user.id => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::failure(
                        "Cannot specify yourself as in-debt friend. \
                         Do you mistype friend matric no. with yours?",
                    )),
                );
            }
            Ok(Some(debtee)) => Some(debtee),
            _ => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::failure(format!(
                        "No member with matric no. '{}'",
                        params.matric
                    ))),
                );
            }
        },
        None => None,
    };

    match manager.start_duty(&user, debtee.as_ref()).await {
        Ok(duty) => {
            let payload = DutyPayload::from_duty(&pool, &duty).await;
            (
                StatusCode::CREATED,
                Json(ApiResponse::success(
                    format!(
                        "Object {} created successfully",
                        duty.describe(Some(&user.name))
                    ),
                    serde_json::to_value(&payload).unwrap_or_default(),
                )),
            )
        }
        Err(e @ DutyError::Database(_)) => {
            tracing::error!("start duty failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Internal error")),
            )
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure(e.to_string())),
        ),
    }
}

#[derive(Deserialize)]
struct DetailQuery {
    matric: String,
}

// GET /duty/api/details - Registered duties of a user
async fn duty_api_detail(
    State(pool): State<DbPool>,
    Query(query): Query<DetailQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    let manager = DutyManager::load(pool.clone());
    if let Err(e) = manager.remove_finished_duties().await {
        tracing::error!("failed to sweep finished duties: {}", e);
    }

    let user = match db::get_user_by_matric(&pool, &query.matric).await {
        Ok(Some(user)) => user,
        _ => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::failure(format!(
                    "No member with matric no. '{}'",
                    query.matric
                ))),
            );
        }
    };

    let duties = match manager.get_duties_of(&user).await {
        Ok(duties) => duties,
        Err(e) => {
            tracing::error!("failed to load duties of {}: {}", user.matric, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure("Internal error")),
            );
        }
    };

    if duties.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure(
                "User's duty is not registered in manager",
            )),
        );
    }

    let mut payloads = Vec::new();
    for duty in &duties {
        payloads.push(DutyPayload::from_duty(&pool, duty).await);
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(
            format!("Duties sent. MAX_DUTY: {}", DutyManager::MAX_DUTY),
            serde_json::to_value(&payloads).unwrap_or_default(),
        )),
    )
}

// ============================================================================
// Card endpoints
// ============================================================================

// POST /duty/:id/cards/:region/toggle - Fold or unfold a card
async fn card_toggle(
    State(pool): State<DbPool>,
    Path((id, region)): Path<(i64, String)>,
) -> Html<String> {
    let Ok(Some(duty)) = db::get_duty(&pool, id).await else {
        return Html(format!("<div id=\"task-cards\">Duty {} not found</div>", id));
    };

    let mut boards = card_boards().lock().unwrap();
    let board = boards.entry(id).or_insert_with(fresh_board);
    board.handle(CardEvent::CollapseToggled { region });

    Html(render_task_cards(&duty, board))
}

// POST /duty/:id/cards/:region/submit - Turn a task in
async fn card_submit(
    State(pool): State<DbPool>,
    Path((id, region)): Path<(i64, String)>,
) -> Html<String> {
    let Ok(Some(duty)) = db::get_duty(&pool, id).await else {
        return Html(format!("<div id=\"task-cards\">Duty {} not found</div>", id));
    };

    if let Err(e) = db::touch_duty_last_active(&pool, id, Utc::now()).await {
        tracing::error!(duty_id = id, "failed to touch last_active: {}", e);
    }

    let mut boards = card_boards().lock().unwrap();
    let board = boards.entry(id).or_insert_with(fresh_board);
    board.handle(CardEvent::TaskSubmitted { region });

    Html(render_task_cards(&duty, board))
}

// ============================================================================
// Rendering Functions
// ============================================================================

async fn render_whoami_page(pool: &DbPool) -> String {
    let users = db::list_users(pool).await.unwrap_or_default();

    let html = maud! {
        !DOCTYPE
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Duty - Dutyhub" }
                link rel="stylesheet" href="/static/system.css";
                link rel="stylesheet" href="/static/app.css";
            }
            body {
                div .duty-page {
                    h1 { "Dutyhub" }
                    p { "Pick your matric no. to see your duty page:" }

                    @if users.is_empty() {
                        div .empty-state {
                            p { "No members yet. Run the seed binary first." }
                        }
                    } @else {
                        ul .member-list {
                            @for user in &users {
                                li {
                                    a href=(format!("/duty/page?matric={}", user.matric)) {
                                        (user.name) " (" (user.matric) ")"
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    };

    html.render().into_inner()
}

fn render_getstarted_page(user: &User, error: Option<&str>) -> String {
    let html = maud! {
        !DOCTYPE
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Get Started - Dutyhub" }
                link rel="stylesheet" href="/static/system.css";
                link rel="stylesheet" href="/static/app.css";
            }
            body {
                div .duty-page {
                    h1 { "Hello, " (user.name) }
                    p { "You are not on duty. Take the next shift?" }

                    @if error.is_some() {
                        div .error-banner { (error.unwrap_or_default()) }
                    }

                    form .start-duty-form action="/duty/start" method="post" {
                        input type="hidden" name="matric" value=(user.matric);

                        label for="debtee-matric" {
                            "Friend's matric no. if you are taking this shift for them (optional):"
                        }
                        input #debtee-matric type="text" name="debtee_matric"
                            placeholder="A17CS0123" maxlength="9";

                        button .btn type="submit" { "Start Duty" }
                    }

                    div .duty-page-footer {
                        a href="/duty/page" { "← Not you?" }
                    }
                }
            }
        }
    };

    html.render().into_inner()
}

fn render_onduty_page(user: &User, duty: &Duty) -> String {
    // First render primes the countdown so the page never starts blank
    let initial_clock = match countdown_for(duty) {
        Ok(countdown) => countdown.lock().unwrap().display().to_string(),
        Err(e) => {
            tracing::error!(duty_id = duty.id, "countdown rejected duty timestamps: {}", e);
            "--:--:--".to_string()
        }
    };

    let clock_html = format!(
        r##"<div class="timer-display" id="timer-display" hx-get="/duty/{}/clock" hx-trigger="every 1s" hx-swap="innerHTML">{}</div>"##,
        duty.id, initial_clock
    );

    let cards_html = {
        let mut boards = card_boards().lock().unwrap();
        let board = boards.entry(duty.id).or_insert_with(fresh_board);
        render_task_cards(duty, board)
    };

    let duty_end = duty_timestamp(duty.duty_end);

    let html = maud! {
        !DOCTYPE
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "On Duty - Dutyhub" }
                link rel="stylesheet" href="/static/system.css";
                link rel="stylesheet" href="/static/app.css";
                script src="https://unpkg.com/htmx.org@2.0.4" {}
            }
            body {
                div .duty-page {
                    h1 { "On Duty: " (user.name) }

                    section .timer-section {
                        h2 { "Time left on shift" }
                        (Raw::dangerously_create(&clock_html))
                        div .timer-caption { "Shift ends at " (duty_end) }
                    }

                    section .task-section {
                        h2 { "Tasks" }
                        (Raw::dangerously_create(&cards_html))
                    }

                    div .duty-page-footer {
                        a href="/duty/page" { "← Members" }
                    }
                }
            }
        }
    };

    html.render().into_inner()
}

fn render_task_cards(duty: &Duty, board: &CardController) -> String {
    let tz = get_timezone();
    let windows = duty.task_windows();

    let mut pairs_html = String::new();
    for (index, (start, end)) in windows.iter().enumerate() {
        let slot = index + 1;
        let window_label = format!(
            "{} – {}",
            start.with_timezone(&tz).format("%H:%M"),
            end.with_timezone(&tz).format("%H:%M")
        );

        pairs_html.push_str(&render_card_pair(duty.id, slot, &window_label, board));
    }

    format!(r#"<div id="task-cards" class="task-card-grid">{}</div>"#, pairs_html)
}

fn render_card_pair(duty_id: i64, slot: usize, window_label: &str, board: &CardController) -> String {
    let active_name = active_region(slot);
    let completed_name = completed_region(slot);

    let mut html = String::new();

    if let Some(active) = board.region(&active_name) {
        if active.visible && active.has_card {
            let body = if active.collapsed {
                String::new()
            } else {
                format!(
                    r##"<div class="duty-card-body">
                        <div class="duty-card-window">Window: {}</div>
                        <button class="btn submit-task-btn" hx-post="/duty/{}/cards/{}/submit" hx-target="#task-cards" hx-swap="outerHTML">Turn In</button>
                    </div>"##,
                    window_label, duty_id, active_name
                )
            };
            html.push_str(&format!(
                r##"<div class="duty-card duty-card-active">
                    <div class="duty-card-header">
                        <span class="duty-card-title">Task {}</span>
                        <button class="btn collapse-btn" hx-post="/duty/{}/cards/{}/toggle" hx-target="#task-cards" hx-swap="outerHTML">⌃</button>
                    </div>
                    {}
                </div>"##,
                slot, duty_id, active_name, body
            ));
        }
    }

    if let Some(completed) = board.region(&completed_name) {
        if completed.visible && completed.has_card {
            let body = if completed.collapsed {
                String::new()
            } else {
                format!(
                    r#"<div class="duty-card-body">Turned in. Window was {}.</div>"#,
                    window_label
                )
            };
            html.push_str(&format!(
                r##"<div class="duty-card duty-card-completed">
                    <div class="duty-card-header">
                        <span class="duty-card-title">✓ Task {}</span>
                        <button class="btn collapse-btn" hx-post="/duty/{}/cards/{}/toggle" hx-target="#task-cards" hx-swap="outerHTML">⌃</button>
                    </div>
                    {}
                </div>"##,
                slot, duty_id, completed_name, body
            ));
        }
    }

    format!(r#"<div class="card-pair">{}</div>"#, html)
}
