//! Parking spot entity

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "spots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub garage_id: i32,

    pub floor: i32,

    /// Bay label, e.g. "B"
    pub bay: String,

    pub spot_number: i32,

    /// compact, standard, oversized, electric, handicap
    pub spot_type: String,

    /// available, occupied, maintenance, reserved
    pub status: String,

    /// JSON array of feature tags
    pub features: String,

    /// Decimal rate stored as text, overrides the garage hourly rate
    pub hourly_rate_override: Option<String>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::parking_session::Entity")]
    ParkingSessions,
}

impl Related<super::parking_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ParkingSessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
