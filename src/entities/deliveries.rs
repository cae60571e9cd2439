//! `SeaORM` Entity for deliveries table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "deliveries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// DOOR_TO_DOOR or DOOR_TO_OFFICE
    pub method: String,
    pub address: Option<String>,
    /// Carrier pickup point code, door-to-office only
    pub pickup_point: Option<String>,
    pub city_code: Option<i32>,
    pub postal_code: Option<String>,
    /// Carrier-assigned entity uuid, set once on registration
    pub delivery_id: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier_status: Option<String>,
    /// NEW, IN_PROGRESS or COMPLETED
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::orders::Entity")]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
