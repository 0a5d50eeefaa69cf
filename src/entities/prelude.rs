pub use super::method_mappings::Entity as MethodMappings;
pub use super::secret_methods::Entity as SecretMethods;
pub use super::secrets::Entity as Secrets;
