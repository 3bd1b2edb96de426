use anyhow::Error;
use rocket::serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::fmt;

use crate::db;
use crate::error::AppError;
use crate::models::{Center, Enrollment, TrainingSession};

use super::{AuthUser, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Student,
    Instructor,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Manager => "manager",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "manager" => Ok(Role::Manager),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of mutation attempted on a schedule or session. Update and delete
/// rights are delegated independently per instructor link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingAction {
    Update,
    Delete,
}

/// A mutating actor must carry a profile; identities without one are scoped
/// to empty results on reads and denied outright on writes.
pub fn require_profile(actor: &AuthUser) -> Result<&Profile, AppError> {
    actor.profile.as_ref().ok_or_else(|| {
        tracing::warn!(username = %actor.username, "Actor has no profile");
        AppError::denied("User has no profile")
    })
}

/// Only the center's owning manager (or a superuser) may mutate the center
/// itself, its instructor links, or its link permission flags.
pub fn ensure_center_owner(actor: &AuthUser, center: &Center) -> Result<(), AppError> {
    if actor.is_superuser {
        return Ok(());
    }
    let profile = require_profile(actor)?;
    if profile.role == Role::Manager && center.manager_id == Some(actor.id) {
        return Ok(());
    }
    tracing::warn!(
        username = %actor.username,
        center_id = %center.id,
        "Center mutation denied"
    );
    Err(AppError::denied("Only the center's manager may do this"))
}

/// Decide whether `actor` may create a schedule or session at `center`, and
/// resolve the instructor the resource will be recorded against.
///
/// Managers must name a linked instructor explicitly; instructors need a
/// link with `can_create_session` and are always forced to themselves no
/// matter what the payload requested.
pub async fn ensure_can_create_training(
    pool: &Pool<Sqlite>,
    actor: &AuthUser,
    center: &Center,
    requested_instructor: Option<i64>,
) -> Result<i64, AppError> {
    if actor.is_superuser {
        let instructor_id = requested_instructor
            .ok_or_else(|| AppError::validation("instructor", "An instructor is required"))?;
        if db::find_instructor_link(pool, center.id, instructor_id)
            .await?
            .is_none()
        {
            return Err(AppError::validation(
                "instructor",
                "Instructor is not linked to this center",
            ));
        }
        return Ok(instructor_id);
    }

    let profile = require_profile(actor)?;
    match profile.role {
        Role::Manager => {
            if center.manager_id != Some(actor.id) {
                return Err(AppError::denied(
                    "Only the center's manager may create trainings here",
                ));
            }
            let instructor_id = requested_instructor.ok_or_else(|| {
                AppError::validation("instructor", "An instructor is required")
            })?;
            if db::find_instructor_link(pool, center.id, instructor_id)
                .await?
                .is_none()
            {
                return Err(AppError::denied(
                    "Instructor is not linked to this center",
                ));
            }
            Ok(instructor_id)
        }
        Role::Instructor => {
            let link = db::find_instructor_link(pool, center.id, actor.id)
                .await?
                .ok_or_else(|| AppError::denied("You are not linked to this center"))?;
            if !link.can_create_session {
                return Err(AppError::denied(
                    "You have no permission to create trainings at this center",
                ));
            }
            Ok(actor.id)
        }
        Role::Student => Err(AppError::denied(
            "Only managers or instructors may create trainings",
        )),
    }
}

/// Decide whether `actor` may update or delete a schedule/session owned by
/// `center` and recorded against `instructor_id`.
pub async fn ensure_can_mutate_training(
    pool: &Pool<Sqlite>,
    actor: &AuthUser,
    center: &Center,
    instructor_id: i64,
    action: TrainingAction,
) -> Result<(), AppError> {
    if actor.is_superuser {
        return Ok(());
    }

    let profile = require_profile(actor)?;
    match profile.role {
        Role::Manager => {
            if center.manager_id != Some(actor.id) {
                return Err(AppError::denied("You may not alter this training"));
            }
            Ok(())
        }
        Role::Instructor => {
            if instructor_id != actor.id {
                return Err(AppError::denied("You may not alter this training"));
            }
            let link = db::find_instructor_link(pool, center.id, actor.id)
                .await?
                .ok_or_else(|| AppError::denied("You are not linked to this center"))?;
            match action {
                TrainingAction::Delete => {
                    if !link.can_cancel_session {
                        return Err(AppError::denied(
                            "You have no permission to cancel trainings at this center",
                        ));
                    }
                }
                TrainingAction::Update => {
                    if !link.can_create_session {
                        return Err(AppError::denied(
                            "You have no permission to alter trainings at this center",
                        ));
                    }
                }
            }
            Ok(())
        }
        Role::Student => Err(AppError::denied("You may not alter this training")),
    }
}

/// Generated sessions belong to their schedule. Direct mutation would let
/// the materialized occurrences drift from the template, so it is rejected
/// for every actor, superusers included.
pub fn ensure_manual_session(session: &TrainingSession) -> Result<(), AppError> {
    if session.is_generated {
        return Err(AppError::validation(
            "session",
            "Generated sessions must be changed through their recurring schedule",
        ));
    }
    Ok(())
}

/// Enrollment confirm/cancel/delete is restricted to the owning student.
pub fn ensure_enrollment_owner(actor: &AuthUser, enrollment: &Enrollment) -> Result<(), AppError> {
    if actor.is_superuser || enrollment.student_id == actor.id {
        return Ok(());
    }
    tracing::warn!(
        username = %actor.username,
        enrollment_id = %enrollment.id,
        "Enrollment mutation denied"
    );
    Err(AppError::denied("You may not alter this enrollment"))
}

/// Attendance lists are visible to the session's instructor, the owning
/// manager of its center, and superusers.
pub fn ensure_can_view_session_enrollments(
    actor: &AuthUser,
    center: &Center,
    session_instructor_id: i64,
) -> Result<(), AppError> {
    if actor.is_superuser || session_instructor_id == actor.id {
        return Ok(());
    }
    let profile = require_profile(actor)?;
    if profile.role == Role::Manager && center.manager_id == Some(actor.id) {
        return Ok(());
    }
    Err(AppError::denied(
        "You may not view this session's enrollments",
    ))
}
