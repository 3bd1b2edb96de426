use chrono::{Local, NaiveDate, NaiveTime, Utc};
use rocket::FromForm;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{
    AuthUser, Role, TrainingAction, UserSession, ensure_can_create_training,
    ensure_can_mutate_training, ensure_can_view_session_enrollments, ensure_center_owner,
    ensure_enrollment_owner, ensure_manual_session, require_profile,
};
use crate::db;
use crate::db::{EnrollmentFilter, SessionFilter, SlotSpec};
use crate::enrollment::{cancel_enrollment, confirm_enrollment, enroll_student};
use crate::error::AppError;
use crate::models::{Center, Enrollment, EnrollmentStatus, RecurringSchedule, TrainingSession, WeeklySlot};
use crate::scheduler;
use crate::scheduler::DEFAULT_WINDOW_DAYS;
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationResponse};

/// The adapter layer owns "now"; the core only ever sees explicit dates.
fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

// ---------------------------------------------------------------------------
// Auth and profile

#[derive(Deserialize, Validate, Clone)]
pub struct SignupRequest {
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    username: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
    role: String,
    display_name: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub role: Option<String>,
    pub display_name: String,
    pub phone: String,
    pub skill_level: String,
    pub certifications: String,
}

impl From<AuthUser> for UserData {
    fn from(user: AuthUser) -> Self {
        let (role, display_name, phone, skill_level, certifications) = match &user.profile {
            Some(p) => (
                Some(p.role.to_string()),
                p.display_name.clone(),
                p.phone.clone(),
                p.skill_level.clone(),
                p.certifications.clone(),
            ),
            None => (None, String::new(), String::new(), String::new(), String::new()),
        };

        Self {
            id: user.id,
            username: user.username,
            is_superuser: user.is_superuser,
            role,
            display_name,
            phone,
            skill_level,
            certifications,
        }
    }
}

#[post("/signup", data = "<signup>")]
pub async fn api_signup(
    signup: Json<SignupRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = signup.validate_custom()?;

    let role = Role::from_str(&validated.role)
        .map_err(|_| AppError::validation("role", "Role must be student, instructor or manager"))
        .validate_custom()?;

    db::create_account(
        db,
        &validated.username,
        &validated.password,
        role,
        validated.display_name.as_deref(),
    )
    .await
    .validate_custom()?;

    Ok(Status::Created)
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    use rocket::http::{Cookie, SameSite};

    let validated = login.validate_custom()?;

    match db::authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            db::create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            cookies.add_private(
                Cookie::build(("user_id", user.id.to_string()))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            cookies.add_private(
                Cookie::build(("logged_in", validated.username))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = db::invalidate_session(db, &token).await;
    }

    cookies.remove_private(rocket::http::Cookie::build("session_token"));
    cookies.remove_private(rocket::http::Cookie::build("user_id"));
    cookies.remove_private(rocket::http::Cookie::build("logged_in"));

    Status::Ok
}

#[get("/me")]
pub async fn api_me(user: AuthUser) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

#[derive(Deserialize, Validate, Clone)]
pub struct ProfileUpdateRequest {
    display_name: Option<String>,
    phone: Option<String>,
    skill_level: Option<String>,
    certifications: Option<String>,
}

/// Contact fields only. The role is fixed at signup and there is no
/// operation that changes it.
#[patch("/profile", data = "<profile>")]
pub async fn api_update_profile(
    profile: Json<ProfileUpdateRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserData>, AppError> {
    let current = require_profile(&user)?;

    let display_name = profile
        .display_name
        .clone()
        .unwrap_or_else(|| current.display_name.clone());
    let phone = profile.phone.clone().unwrap_or_else(|| current.phone.clone());
    let skill_level = profile
        .skill_level
        .clone()
        .unwrap_or_else(|| current.skill_level.clone());
    let certifications = profile
        .certifications
        .clone()
        .unwrap_or_else(|| current.certifications.clone());

    db::update_profile(db, user.id, &display_name, &phone, &skill_level, &certifications).await?;

    let refreshed = db::get_auth_user(db, user.id).await?;
    Ok(Json(UserData::from(refreshed)))
}

// ---------------------------------------------------------------------------
// Platform metrics and health

#[derive(Serialize, Deserialize)]
pub struct MetricsResponse {
    pub centers: i64,
    pub instructors: i64,
    pub students: i64,
    pub upcoming_sessions: i64,
}

#[get("/metrics")]
pub async fn api_metrics(db: &State<Pool<Sqlite>>) -> Result<Json<MetricsResponse>, AppError> {
    let today = local_today();
    Ok(Json(MetricsResponse {
        centers: db::count_centers(db).await?,
        instructors: db::count_profiles_with_role(db, Role::Instructor).await?,
        students: db::count_profiles_with_role(db, Role::Student).await?,
        upcoming_sessions: db::count_sessions_from(db, today).await?,
    }))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

// ---------------------------------------------------------------------------
// Centers

#[derive(Deserialize, Validate, Clone)]
pub struct CenterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
    #[validate(length(min = 1, message = "Address is required"))]
    address: String,
    contact: String,
    activities: String,
    tax_id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[get("/centers")]
pub async fn api_list_centers(db: &State<Pool<Sqlite>>) -> Result<Json<Vec<Center>>, AppError> {
    Ok(Json(db::list_centers(db).await?))
}

#[get("/centers/mine")]
pub async fn api_my_centers(
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Center>>, AppError> {
    if !user.is_superuser && require_profile(&user)?.role != Role::Manager {
        return Err(AppError::denied("Only managers have centers of their own"));
    }
    Ok(Json(db::list_centers_by_manager(db, user.id).await?))
}

#[get("/centers/<id>", rank = 2)]
pub async fn api_get_center(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Center>, AppError> {
    Ok(Json(db::get_center(db, id).await?))
}

#[post("/centers", data = "<center>")]
pub async fn api_create_center(
    center: Json<CenterRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Center>, Custom<Json<ValidationResponse>>> {
    let validated = center.validate_custom()?;

    if !user.is_superuser && !user.has_role(Role::Manager) {
        return Err(AppError::denied("Only managers may create training centers"))
            .validate_custom();
    }

    let id = db::create_center(
        db,
        user.id,
        &validated.name,
        &validated.address,
        &validated.contact,
        &validated.activities,
        &validated.tax_id,
        validated.latitude,
        validated.longitude,
    )
    .await
    .validate_custom()?;

    let created = db::get_center(db, id).await.validate_custom()?;
    Ok(Json(created))
}

#[put("/centers/<id>", data = "<center>")]
pub async fn api_update_center(
    id: i64,
    center: Json<CenterRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Center>, AppError> {
    let existing = db::get_center(db, id).await?;
    ensure_center_owner(&user, &existing)?;

    db::update_center(
        db,
        id,
        &center.name,
        &center.address,
        &center.contact,
        &center.activities,
        &center.tax_id,
        center.latitude,
        center.longitude,
    )
    .await?;

    Ok(Json(db::get_center(db, id).await?))
}

#[delete("/centers/<id>")]
pub async fn api_delete_center(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    let existing = db::get_center(db, id).await?;
    ensure_center_owner(&user, &existing)?;

    db::delete_center(db, id).await?;
    Ok(Status::NoContent)
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session: TrainingSession,
    pub seats_available: i64,
}

async fn with_seats(
    db: &Pool<Sqlite>,
    sessions: Vec<TrainingSession>,
) -> Result<Vec<SessionResponse>, AppError> {
    let mut out = Vec::with_capacity(sessions.len());
    for session in sessions {
        let taken = db::seats_taken(db, session.id).await?;
        let seats_available = (session.capacity - taken).max(0);
        out.push(SessionResponse {
            session,
            seats_available,
        });
    }
    Ok(out)
}

/// Public catalog: upcoming sessions at one center.
#[get("/centers/<id>/sessions")]
pub async fn api_center_sessions(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let center = db::get_center(db, id).await?;
    let sessions = db::list_center_sessions(db, center.id, local_today()).await?;
    Ok(Json(with_seats(db, sessions).await?))
}

#[derive(Deserialize)]
pub struct AddInstructorRequest {
    instructor_id: i64,
}

#[post("/centers/<id>/instructors", data = "<request>")]
pub async fn api_add_instructor(
    id: i64,
    request: Json<AddInstructorRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<crate::models::InstructorLink>, AppError> {
    let center = db::get_center(db, id).await?;
    ensure_center_owner(&user, &center)?;

    let link_id = db::add_instructor(db, id, request.instructor_id).await?;
    Ok(Json(db::get_instructor_link(db, link_id).await?))
}

#[delete("/centers/<id>/instructors/<instructor_id>")]
pub async fn api_remove_instructor(
    id: i64,
    instructor_id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    let center = db::get_center(db, id).await?;
    ensure_center_owner(&user, &center)?;

    db::remove_instructor(db, id, instructor_id, local_today()).await?;
    Ok(Status::NoContent)
}

// ---------------------------------------------------------------------------
// Instructor links (delegated permission flags)

#[derive(Deserialize)]
pub struct LinkUpdateRequest {
    can_create_session: Option<bool>,
    can_cancel_session: Option<bool>,
}

#[get("/instructor-links")]
pub async fn api_list_links(
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<crate::models::InstructorLink>>, AppError> {
    Ok(Json(db::list_instructor_links(db, &user).await?))
}

/// Flag transitions are manager-issued only; an instructor can read their
/// own links but never flip their own permissions.
#[put("/instructor-links/<id>", data = "<request>")]
pub async fn api_update_link(
    id: i64,
    request: Json<LinkUpdateRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<crate::models::InstructorLink>, AppError> {
    let link = db::get_instructor_link(db, id).await?;
    let center = db::get_center(db, link.center_id).await?;
    ensure_center_owner(&user, &center)?;

    let can_create = request.can_create_session.unwrap_or(link.can_create_session);
    let can_cancel = request.can_cancel_session.unwrap_or(link.can_cancel_session);

    Ok(Json(db::update_link_flags(db, id, can_create, can_cancel).await?))
}

// ---------------------------------------------------------------------------
// Recurring schedules

#[derive(Deserialize, Validate, Clone)]
pub struct ScheduleRequest {
    center: i64,
    instructor: Option<i64>,
    #[validate(length(min = 1, message = "Activity is required"))]
    activity: String,
    #[validate(range(min = 1, message = "Capacity must be positive"))]
    capacity: i64,
    skill_level: Option<String>,
    notes: Option<String>,
    #[validate(length(min = 1, message = "At least one slot is required"))]
    slots: Vec<SlotSpec>,
}

#[derive(Serialize)]
pub struct ScheduleWithSlots {
    pub schedule: RecurringSchedule,
    pub slots: Vec<WeeklySlot>,
}

#[derive(Serialize)]
pub struct ScheduleMutationResponse {
    pub schedule: RecurringSchedule,
    pub slots: Vec<WeeklySlot>,
    pub occurrences_created: u64,
}

#[get("/schedules")]
pub async fn api_list_schedules(
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ScheduleWithSlots>>, AppError> {
    let schedules = db::list_schedules(db, &user).await?;
    let mut out = Vec::with_capacity(schedules.len());
    for schedule in schedules {
        let slots = db::get_weekly_slots(db, schedule.id).await?;
        out.push(ScheduleWithSlots { schedule, slots });
    }
    Ok(Json(out))
}

#[post("/schedules", data = "<request>")]
pub async fn api_create_schedule(
    request: Json<ScheduleRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ScheduleMutationResponse>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    let center = db::get_center(db, validated.center).await.validate_custom()?;
    let instructor_id =
        ensure_can_create_training(db, &user, &center, validated.instructor)
            .await
            .validate_custom()?;

    let schedule_id = db::create_schedule(
        db,
        center.id,
        instructor_id,
        &validated.activity,
        validated.capacity,
        validated.skill_level.as_deref().unwrap_or(""),
        validated.notes.as_deref().unwrap_or(""),
        &validated.slots,
    )
    .await
    .validate_custom()?;

    let occurrences_created =
        scheduler::regenerate_occurrences(db, schedule_id, local_today(), DEFAULT_WINDOW_DAYS)
            .await
            .validate_custom()?;

    let schedule = db::get_schedule(db, schedule_id).await.validate_custom()?;
    let slots = db::get_weekly_slots(db, schedule_id).await.validate_custom()?;

    Ok(Json(ScheduleMutationResponse {
        schedule,
        slots,
        occurrences_created,
    }))
}

#[put("/schedules/<id>", data = "<request>")]
pub async fn api_update_schedule(
    id: i64,
    request: Json<ScheduleRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ScheduleMutationResponse>, AppError> {
    let schedule = db::get_schedule(db, id).await?;
    let center = db::get_center(db, schedule.center_id).await?;

    ensure_can_mutate_training(db, &user, &center, schedule.instructor_id, TrainingAction::Update)
        .await?;

    let instructor_id = request.instructor.unwrap_or(schedule.instructor_id);
    if instructor_id != schedule.instructor_id {
        if !user.is_superuser && !user.has_role(Role::Manager) {
            return Err(AppError::denied(
                "Only the center's manager may reassign the instructor",
            ));
        }
        if db::find_instructor_link(db, center.id, instructor_id)
            .await?
            .is_none()
        {
            return Err(AppError::denied("Instructor is not linked to this center"));
        }
    }

    db::update_schedule(
        db,
        id,
        instructor_id,
        &request.activity,
        request.capacity,
        request.skill_level.as_deref().unwrap_or(""),
        request.notes.as_deref().unwrap_or(""),
        Some(request.slots.as_slice()),
    )
    .await?;

    let occurrences_created =
        scheduler::regenerate_occurrences(db, id, local_today(), DEFAULT_WINDOW_DAYS).await?;

    let schedule = db::get_schedule(db, id).await?;
    let slots = db::get_weekly_slots(db, id).await?;

    Ok(Json(ScheduleMutationResponse {
        schedule,
        slots,
        occurrences_created,
    }))
}

#[delete("/schedules/<id>")]
pub async fn api_delete_schedule(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    let schedule = db::get_schedule(db, id).await?;
    let center = db::get_center(db, schedule.center_id).await?;

    ensure_can_mutate_training(db, &user, &center, schedule.instructor_id, TrainingAction::Delete)
        .await?;

    db::delete_schedule(db, id, local_today()).await?;
    Ok(Status::NoContent)
}

// ---------------------------------------------------------------------------
// Training sessions

#[derive(Deserialize, Validate, Clone)]
pub struct SessionRequest {
    center: i64,
    instructor: Option<i64>,
    #[validate(length(min = 1, message = "Activity is required"))]
    activity: String,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    #[validate(range(min = 1, message = "Capacity must be positive"))]
    capacity: i64,
    skill_level: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
pub struct SessionUpdateRequest {
    activity: Option<String>,
    date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    capacity: Option<i64>,
    skill_level: Option<String>,
    notes: Option<String>,
}

#[derive(FromForm)]
pub struct SessionsQueryParams {
    center: Option<i64>,
    date_max: Option<String>,
}

#[get("/sessions?<params..>")]
pub async fn api_list_sessions(
    params: SessionsQueryParams,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let date_max = match params.date_max.as_deref() {
        Some(raw) => Some(raw.parse::<NaiveDate>().map_err(|_| {
            AppError::validation("date_max", "Expected an ISO date (YYYY-MM-DD)")
        })?),
        None => None,
    };

    let filter = SessionFilter {
        center: params.center,
        date_max,
    };

    let sessions = db::list_training_sessions(db, &user, &filter, local_today()).await?;
    Ok(Json(with_seats(db, sessions).await?))
}

#[get("/sessions/<id>")]
pub async fn api_get_session(
    id: i64,
    _user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = db::get_training_session(db, id).await?;
    let taken = db::seats_taken(db, id).await?;
    let seats_available = (session.capacity - taken).max(0);
    Ok(Json(SessionResponse {
        session,
        seats_available,
    }))
}

#[post("/sessions", data = "<request>")]
pub async fn api_create_session(
    request: Json<SessionRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionResponse>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    let center = db::get_center(db, validated.center).await.validate_custom()?;
    let instructor_id =
        ensure_can_create_training(db, &user, &center, validated.instructor)
            .await
            .validate_custom()?;

    let id = db::create_training_session(
        db,
        center.id,
        instructor_id,
        &validated.activity,
        validated.date,
        validated.start_time,
        validated.end_time,
        validated.capacity,
        validated.skill_level.as_deref().unwrap_or(""),
        validated.notes.as_deref().unwrap_or(""),
    )
    .await
    .validate_custom()?;

    let session = db::get_training_session(db, id).await.validate_custom()?;
    let seats_available = session.capacity;
    Ok(Json(SessionResponse {
        session,
        seats_available,
    }))
}

#[put("/sessions/<id>", data = "<request>")]
pub async fn api_update_session(
    id: i64,
    request: Json<SessionUpdateRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = db::get_training_session(db, id).await?;
    ensure_manual_session(&session)?;

    let center = db::get_center(db, session.center_id).await?;
    ensure_can_mutate_training(db, &user, &center, session.instructor_id, TrainingAction::Update)
        .await?;

    db::update_training_session(
        db,
        id,
        request.activity.as_deref().unwrap_or(&session.activity),
        request.date.unwrap_or(session.date),
        request.start_time.unwrap_or(session.start_time),
        request.end_time.unwrap_or(session.end_time),
        request.capacity.unwrap_or(session.capacity),
        request.skill_level.as_deref().unwrap_or(&session.skill_level),
        request.notes.as_deref().unwrap_or(&session.notes),
    )
    .await?;

    let session = db::get_training_session(db, id).await?;
    let taken = db::seats_taken(db, id).await?;
    let seats_available = (session.capacity - taken).max(0);
    Ok(Json(SessionResponse {
        session,
        seats_available,
    }))
}

#[delete("/sessions/<id>")]
pub async fn api_delete_session(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    let session = db::get_training_session(db, id).await?;
    ensure_manual_session(&session)?;

    let center = db::get_center(db, session.center_id).await?;
    ensure_can_mutate_training(db, &user, &center, session.instructor_id, TrainingAction::Delete)
        .await?;

    db::delete_training_session(db, id).await?;
    Ok(Status::NoContent)
}

#[get("/sessions/<id>/enrollments")]
pub async fn api_session_enrollments(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Enrollment>>, AppError> {
    let session = db::get_training_session(db, id).await?;
    let center = db::get_center(db, session.center_id).await?;
    ensure_can_view_session_enrollments(&user, &center, session.instructor_id)?;

    Ok(Json(db::list_session_enrollments(db, id).await?))
}

// ---------------------------------------------------------------------------
// Enrollments

#[derive(Deserialize)]
pub struct EnrollmentRequest {
    session: i64,
}

#[derive(FromForm)]
pub struct EnrollmentsQueryParams {
    session: Option<i64>,
    status: Option<String>,
}

#[get("/enrollments?<params..>")]
pub async fn api_list_enrollments(
    params: EnrollmentsQueryParams,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Enrollment>>, AppError> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(EnrollmentStatus::from_str(raw).map_err(|_| {
            AppError::validation("status", "Expected PENDING, CONFIRMED or CANCELED")
        })?),
        None => None,
    };

    let filter = EnrollmentFilter {
        session: params.session,
        status,
    };

    Ok(Json(db::list_enrollments(db, &user, &filter).await?))
}

/// Students enroll themselves; the acting student is always the enrollment's
/// student no matter what the payload says.
#[post("/enrollments", data = "<request>")]
pub async fn api_create_enrollment(
    request: Json<EnrollmentRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Enrollment>, AppError> {
    let profile = require_profile(&user)?;
    if profile.role != Role::Student {
        return Err(AppError::denied("Only students may enroll in sessions"));
    }

    db::get_training_session(db, request.session).await?;

    Ok(Json(enroll_student(db, request.session, user.id).await?))
}

#[post("/enrollments/<id>/confirm")]
pub async fn api_confirm_enrollment(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Enrollment>, AppError> {
    let enrollment = db::get_enrollment(db, id).await?;
    ensure_enrollment_owner(&user, &enrollment)?;

    Ok(Json(confirm_enrollment(db, &enrollment).await?))
}

#[post("/enrollments/<id>/cancel")]
pub async fn api_cancel_enrollment(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Enrollment>, AppError> {
    let enrollment = db::get_enrollment(db, id).await?;
    ensure_enrollment_owner(&user, &enrollment)?;

    Ok(Json(cancel_enrollment(db, &enrollment).await?))
}

#[delete("/enrollments/<id>")]
pub async fn api_delete_enrollment(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    let enrollment = db::get_enrollment(db, id).await?;
    ensure_enrollment_owner(&user, &enrollment)?;

    db::delete_enrollment(db, id).await?;
    Ok(Status::NoContent)
}

// ---------------------------------------------------------------------------
// Maintenance

#[post("/maintenance/run?<days_ahead>")]
pub async fn api_run_maintenance(
    days_ahead: Option<i64>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<scheduler::MaintenanceReport>, AppError> {
    if !user.is_superuser {
        return Err(AppError::denied("Only superusers may run maintenance"));
    }

    let days_ahead = days_ahead.unwrap_or(DEFAULT_WINDOW_DAYS);
    let report = scheduler::run_maintenance(db, local_today(), days_ahead).await?;
    Ok(Json(report))
}
