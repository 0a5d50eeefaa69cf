use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "secret_methods")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub secret_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub method_mapping_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::secrets::Entity",
        from = "Column::SecretId",
        to = "super::secrets::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Secrets,
    #[sea_orm(
        belongs_to = "super::method_mappings::Entity",
        from = "Column::MethodMappingId",
        to = "super::method_mappings::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    MethodMappings,
}

impl Related<super::secrets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Secrets.def()
    }
}

impl Related<super::method_mappings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MethodMappings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
