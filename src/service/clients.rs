use super::validation::{require_name, require_optional_name};
use super::{InsightsService, by_parent};
use crate::cascade::CascadeSummary;
use crate::error::Result;
use crate::models::{Brand, BrandPatch, Client, ClientPatch, ClientStatus, NewBrand, NewClient, to_fields};
use crate::store::{Collection, Query};

impl InsightsService {
    pub async fn add_client(&self, client: NewClient) -> Result<String> {
        require_name("client", &client.name)?;
        self.create_entity("add_client", &Collection::Clients, to_fields(&client)?)
            .await
    }

    pub async fn get_client(&self, id: &str) -> Result<Option<Client>> {
        self.fetch("get_client", &Collection::Clients, id).await
    }

    /// Clients by name, optionally only those with the given status
    pub async fn list_clients(&self, status: Option<ClientStatus>) -> Result<Vec<Client>> {
        let query = match status {
            Some(status) => Query::by_name().where_eq("status", status.to_string()),
            None => Query::by_name(),
        };
        self.fetch_list("list_clients", &Collection::Clients, &query).await
    }

    /// Renaming does not touch names already cached on campaigns; they
    /// pick up the new name on their next write.
    pub async fn update_client(&self, id: &str, patch: ClientPatch) -> Result<()> {
        require_optional_name("client", patch.name.as_deref())?;
        self.update_entity("update_client", &Collection::Clients, id, to_fields(&patch)?)
            .await
    }

    /// Removes the client, its brands, its campaigns and everything under
    /// them. Deleting an absent client succeeds.
    pub async fn delete_client(&self, id: &str) -> Result<CascadeSummary> {
        self.cascade.delete_client(id).await
    }

    pub async fn add_brand(&self, brand: NewBrand) -> Result<String> {
        require_name("brand", &brand.name)?;
        require_name("brand client", &brand.client_id)?;
        self.create_entity("add_brand", &Collection::Brands, to_fields(&brand)?)
            .await
    }

    pub async fn get_brand(&self, id: &str) -> Result<Option<Brand>> {
        self.fetch("get_brand", &Collection::Brands, id).await
    }

    pub async fn list_brands(&self, client_id: Option<&str>) -> Result<Vec<Brand>> {
        self.fetch_list("list_brands", &Collection::Brands, &by_parent("clientId", client_id))
            .await
    }

    pub async fn update_brand(&self, id: &str, patch: BrandPatch) -> Result<()> {
        require_optional_name("brand", patch.name.as_deref())?;
        self.update_entity("update_brand", &Collection::Brands, id, to_fields(&patch)?)
            .await
    }

    pub async fn delete_brand(&self, id: &str) -> Result<CascadeSummary> {
        self.cascade.delete_brand(id).await
    }
}
