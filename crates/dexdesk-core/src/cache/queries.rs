use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{ApiError, AuthenticatedClient};
use crate::models::{Page, ResourceModel};

use super::{QueryKey, RequestCache};

/// Default rows per page for list screens.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Page size and search text that the cached pages of a resource were fetched with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ListParams {
    limit: u32,
    search: Option<String>,
}

/// Cached CRUD queries for one resource.
///
/// List pages are cached under `[resource, page]`, details under
/// `[resource, "detail", id]` and dropdowns under `[resource, "dropdown", keyword]`.
/// A change of page size or search text, and any successful mutation,
/// invalidates everything under `[resource]`.
pub struct ResourceQueries<M: ResourceModel> {
    client: AuthenticatedClient,
    _model: PhantomData<fn() -> M>,
}

impl<M: ResourceModel> ResourceQueries<M> {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self {
            client,
            _model: PhantomData,
        }
    }

    fn cache(&self) -> &RequestCache {
        self.client.session().cache()
    }

    fn prefix() -> QueryKey {
        QueryKey::from(M::RESOURCE.path())
    }

    fn params_key() -> QueryKey {
        QueryKey::new(["list-params", M::RESOURCE.path()])
    }

    fn store<T: Serialize + ?Sized>(&self, key: QueryKey, data: &T) {
        if let Err(e) = self.cache().write_as(key, data) {
            warn!(resource = %M::RESOURCE, error = %e, "Failed to cache query result");
        }
    }

    /// Invalidate cached pages if the listing parameters changed
    fn sync_params(&self, limit: u32, search: Option<&str>) {
        let next = ListParams {
            limit,
            search: search.filter(|s| !s.is_empty()).map(str::to_owned),
        };
        let key = Self::params_key();
        let current: Option<ListParams> = self.cache().read_as(&key);
        if current.as_ref() == Some(&next) {
            return;
        }
        if current.is_some() {
            let count = self.cache().invalidate(&Self::prefix());
            debug!(resource = %M::RESOURCE, count, "List parameters changed, invalidated pages");
        }
        self.store(key, &next);
    }

    /// One page of the listing. `page` is zero-based.
    pub async fn list(&self, page: u32, limit: u32, search: Option<&str>) -> Result<Page<M>, ApiError> {
        self.sync_params(limit, search);
        let key = QueryKey::page(M::RESOURCE.path(), page);
        if let Some(cached) = self.cache().read_fresh_as::<Page<M>>(&key) {
            debug!(resource = %M::RESOURCE, page, "Serving page from cache");
            return Ok(cached);
        }

        let search = search.map(str::to_owned);
        let fetched = self
            .client
            .call(|api, token| async move {
                api.list::<M>(&token, page, limit, search.as_deref()).await
            })
            .await?;
        self.store(key, &fetched);
        Ok(fetched)
    }

    pub async fn get(&self, id: i64) -> Result<M, ApiError> {
        let key = QueryKey::new([M::RESOURCE.path().to_string(), "detail".to_string(), id.to_string()]);
        if let Some(cached) = self.cache().read_fresh_as::<M>(&key) {
            return Ok(cached);
        }
        let fetched = self
            .client
            .call(|api, token| async move { api.get::<M>(&token, id).await })
            .await?;
        self.store(key, &fetched);
        Ok(fetched)
    }

    pub async fn dropdown(&self, keyword: Option<&str>) -> Result<Vec<M::Dropdown>, ApiError> {
        let keyword = keyword.filter(|k| !k.is_empty()).map(str::to_owned);
        let key = QueryKey::new([
            M::RESOURCE.path().to_string(),
            "dropdown".to_string(),
            keyword.clone().unwrap_or_default(),
        ]);
        if let Some(cached) = self.cache().read_fresh_as::<Vec<M::Dropdown>>(&key) {
            return Ok(cached);
        }
        let fetched = self
            .client
            .call(|api, token| async move { api.dropdown::<M>(&token, keyword.as_deref()).await })
            .await?;
        self.store(key, &fetched);
        Ok(fetched)
    }

    pub async fn create(&self, input: &M::Input) -> Result<M, ApiError> {
        let created = self
            .client
            .call(|api, token| async move { api.create::<M>(&token, input).await })
            .await?;
        self.refresh();
        Ok(created)
    }

    pub async fn update(&self, id: i64, input: &M::Input) -> Result<M, ApiError> {
        let updated = self
            .client
            .call(|api, token| async move { api.update::<M>(&token, id, input).await })
            .await?;
        self.refresh();
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client
            .call(|api, token| async move { api.delete::<M>(&token, id).await })
            .await?;
        self.refresh();
        Ok(())
    }

    /// Mark every cached query of this resource stale
    pub fn refresh(&self) -> usize {
        self.cache().invalidate(&Self::prefix())
    }
}
