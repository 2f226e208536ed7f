//! The EcoMarket home dashboard as a set of descriptors.

use std::time::Duration;

use crate::api::EcoMarketApi;
use crate::coordinator::{Descriptor, Priority};
use crate::types::{Notification, Product, ProductFilter, Profile};

pub const PRODUCTS: &str = "productos";
pub const CATEGORIES: &str = "categorias";
pub const PROFILE: &str = "perfil";
pub const NOTIFICATIONS: &str = "notificaciones";

/// Payload of one dashboard section.
#[derive(Debug, Clone, PartialEq)]
pub enum Panel {
    Products(Vec<Product>),
    Categories(Vec<String>),
    Profile(Profile),
    Notifications(Vec<Notification>),
}

impl Panel {
    pub fn as_products(&self) -> Option<&[Product]> {
        match self {
            Panel::Products(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_categories(&self) -> Option<&[String]> {
        match self {
            Panel::Categories(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&Profile> {
        match self {
            Panel::Profile(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_notifications(&self) -> Option<&[Notification]> {
        match self {
            Panel::Notifications(n) => Some(n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardTimeouts {
    pub products: Duration,
    pub categories: Duration,
    pub profile: Duration,
    pub notifications: Duration,
}

impl Default for DashboardTimeouts {
    fn default() -> Self {
        Self {
            products: Duration::from_secs(5),
            categories: Duration::from_secs(3),
            profile: Duration::from_secs(2),
            notifications: Duration::from_secs(4),
        }
    }
}

/// Products and profile are critical; categories and notifications are
/// secondary.
pub fn standard_descriptors(api: &EcoMarketApi) -> Vec<Descriptor<Panel>> {
    standard_descriptors_with(api, &DashboardTimeouts::default())
}

pub fn standard_descriptors_with(api: &EcoMarketApi, timeouts: &DashboardTimeouts) -> Vec<Descriptor<Panel>> {
    let products = api.clone();
    let categories = api.clone();
    let profile = api.clone();
    let notifications = api.clone();
    vec![
        Descriptor::new(PRODUCTS, timeouts.products, move |d| async move {
            products
                .list_products(&ProductFilter::default(), Some(d))
                .await
                .map(Panel::Products)
        })
        .with_priority(Priority::Critical),
        Descriptor::new(CATEGORIES, timeouts.categories, move |d| async move {
            categories.list_categories(Some(d)).await.map(Panel::Categories)
        }),
        Descriptor::new(PROFILE, timeouts.profile, move |d| async move {
            profile.get_profile(Some(d)).await.map(Panel::Profile)
        })
        .with_priority(Priority::Critical),
        Descriptor::new(NOTIFICATIONS, timeouts.notifications, move |d| async move {
            notifications
                .list_notifications(Some(d))
                .await
                .map(Panel::Notifications)
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{
        api, Reply, ScriptedTransport, CATEGORIES as CATEGORIES_JSON, NOTIFICATIONS as NOTIFICATIONS_JSON,
        PRODUCTS as PRODUCTS_JSON, PROFILE as PROFILE_JSON,
    };
    use crate::coordinator::{Coordinator, TaskStatus};
    use crate::error::ErrorKind;
    use tokio::time::Instant;

    fn transport(profile: Reply) -> ScriptedTransport {
        ScriptedTransport::default()
            .reply("productos", Reply::json(1_000, 200, PRODUCTS_JSON))
            .reply("categorias", Reply::json(300, 200, CATEGORIES_JSON))
            .reply("perfil", profile)
            .reply("notificaciones", Reply::json(3_500, 200, NOTIFICATIONS_JSON))
    }

    #[test]
    fn standard_set_has_expected_shape() {
        let descriptors = standard_descriptors(&api(ScriptedTransport::default()));
        let shape: Vec<_> = descriptors
            .iter()
            .map(|d| (d.name().to_string(), d.priority(), d.timeout().as_secs()))
            .collect();
        assert_eq!(
            shape,
            [
                ("productos".to_string(), Priority::Critical, 5),
                ("categorias".to_string(), Priority::Secondary, 3),
                ("perfil".to_string(), Priority::Critical, 2),
                ("notificaciones".to_string(), Priority::Secondary, 4),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_dashboard_loads_concurrently() {
        let api = api(transport(Reply::json(500, 200, PROFILE_JSON)));
        let start = Instant::now();
        let result = Coordinator::new()
            .wait_all(standard_descriptors(&api))
            .await
            .unwrap();
        let ms = start.elapsed().as_millis();
        assert!((3_500..3_520).contains(&ms), "{ms}");
        assert_eq!(result.data.len(), 4);
        assert_eq!(result.get(PROFILE).and_then(Panel::as_profile).unwrap().nombre, "Usuario Test");
        assert_eq!(result.get(CATEGORIES).and_then(Panel::as_categories).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_profile_times_out_alone() {
        let api = api(transport(Reply::json(2_500, 200, PROFILE_JSON)));
        let result = Coordinator::new()
            .wait_all(standard_descriptors(&api))
            .await
            .unwrap();
        assert_eq!(result.error(PROFILE).unwrap().kind, ErrorKind::Timeout);
        assert_eq!(result.data.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_stops_the_dashboard() {
        let api = api(transport(Reply::json(200, 401, r#"{"detail":"token expirado"}"#)));
        let start = Instant::now();
        let result = Coordinator::new()
            .cancel_on_unauthorized(standard_descriptors(&api))
            .await
            .unwrap();
        let ms = start.elapsed().as_millis();
        assert!((200..220).contains(&ms), "{ms}");
        assert!(result.cancelled_by_auth);
        assert_eq!(result.status(PRODUCTS), Some(TaskStatus::Cancelled));
        assert_eq!(result.status(NOTIFICATIONS), Some(TaskStatus::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn critical_panels_arrive_first() {
        let api = api(transport(Reply::json(500, 200, PROFILE_JSON)));
        let start = Instant::now();
        let partial = Coordinator::new()
            .prioritized(standard_descriptors(&api))
            .await
            .unwrap();
        let ms = start.elapsed().as_millis();
        assert!((1_000..1_020).contains(&ms), "{ms}");

        let now = partial.current();
        assert!(now.get(PRODUCTS).and_then(Panel::as_products).is_some());
        assert_eq!(now.status(NOTIFICATIONS), Some(TaskStatus::Pending));

        let done = partial.finish().await.unwrap();
        assert!(done.get(NOTIFICATIONS).and_then(Panel::as_notifications).is_some());
    }
}
