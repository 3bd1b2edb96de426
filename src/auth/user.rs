use serde::Serialize;

use super::Role;

/// The authenticated identity. A user may exist without a profile (e.g. an
/// account created out-of-band); authorization treats that as "no role":
/// list operations scope to empty, mutations are denied.
#[derive(Debug, Serialize, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub profile: Option<Profile>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub role: Role,
    pub display_name: String,
    pub phone: String,
    pub skill_level: String,
    pub certifications: String,
}

/// Flat row of users LEFT JOIN profiles.
#[derive(sqlx::FromRow, Clone)]
pub struct DbAuthUser {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub profile_id: Option<i64>,
    pub role: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub skill_level: Option<String>,
    pub certifications: Option<String>,
}

impl From<DbAuthUser> for AuthUser {
    fn from(row: DbAuthUser) -> Self {
        let profile = match (row.profile_id, row.role.as_deref()) {
            (Some(profile_id), Some(role)) => {
                Role::from_str(role).ok().map(|role| Profile {
                    id: profile_id,
                    user_id: row.id,
                    role,
                    display_name: row.display_name.unwrap_or_default(),
                    phone: row.phone.unwrap_or_default(),
                    skill_level: row.skill_level.unwrap_or_default(),
                    certifications: row.certifications.unwrap_or_default(),
                })
            }
            _ => None,
        };

        Self {
            id: row.id,
            username: row.username,
            is_superuser: row.is_superuser,
            profile,
        }
    }
}

impl AuthUser {
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|p| p.role)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }
}
