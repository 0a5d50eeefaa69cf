use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "method_mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub method: String,
    pub uri: String, // e.g. "/user/datalake/staging/cpf"
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// Comma separated header names, empty when no schema check applies
    #[sea_orm(column_type = "Text")]
    pub mandatory_headers: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::secret_methods::Entity")]
    SecretMethods,
}

impl Related<super::secret_methods::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SecretMethods.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
