//! In-memory data source for tests that do not need SQLite.

use super::{CatalogSource, ClickMatch, ConversionSource, DataSourceError, ReferralSource};
use crate::domain::{
    ClickEvent, ConversionEvent, CustomerId, Marketer, MarketerId, Product, ProductId,
    ReferralLink, TimeMs, TrackingCode,
};
use async_trait::async_trait;

/// Mock data source that returns predefined test data.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    links: Vec<ReferralLink>,
    clicks: Vec<ClickEvent>,
    products: Vec<Product>,
    marketers: Vec<Marketer>,
    conversions: Vec<ConversionEvent>,
    unavailable: bool,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link(mut self, link: ReferralLink) -> Self {
        self.links.push(link);
        self
    }

    /// Add a click; ids are assigned in insertion order when left at zero.
    pub fn with_click(mut self, mut click: ClickEvent) -> Self {
        if click.id == 0 {
            click.id = self.clicks.len() as i64 + 1;
        }
        self.clicks.push(click);
        self
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.products.push(product);
        self
    }

    pub fn with_marketer(mut self, marketer: Marketer) -> Self {
        self.marketers.push(marketer);
        self
    }

    pub fn with_conversion(mut self, conversion: ConversionEvent) -> Self {
        self.conversions.push(conversion);
        self
    }

    /// Make every call fail as if the store were unreachable.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check(&self) -> Result<(), DataSourceError> {
        if self.unavailable {
            Err(DataSourceError::Unavailable("mock store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReferralSource for MockDataSource {
    async fn find_active_referral_link(
        &self,
        tracking_code: &TrackingCode,
        now: TimeMs,
    ) -> Result<Option<ReferralLink>, DataSourceError> {
        self.check()?;
        Ok(self
            .links
            .iter()
            .find(|l| &l.tracking_code == tracking_code && l.is_live(now))
            .cloned())
    }

    async fn find_clicks_matching(
        &self,
        signal: ClickMatch<'_>,
        since: TimeMs,
    ) -> Result<Vec<ClickEvent>, DataSourceError> {
        self.check()?;
        let mut matches: Vec<ClickEvent> = self
            .clicks
            .iter()
            .filter(|c| c.timestamp >= since)
            .filter(|c| match &signal {
                ClickMatch::Session(s) => c.session_id == *s,
                ClickMatch::Fingerprint(f) => c.fingerprint == *f,
                ClickMatch::Ip(ip) => c.ip_address == *ip,
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(matches)
    }
}

#[async_trait]
impl CatalogSource for MockDataSource {
    async fn get_active_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<Product>, DataSourceError> {
        self.check()?;
        Ok(self.products.iter().find(|p| &p.id == product_id).cloned())
    }

    async fn get_active_marketer(
        &self,
        marketer_id: &MarketerId,
    ) -> Result<Option<Marketer>, DataSourceError> {
        self.check()?;
        Ok(self.marketers.iter().find(|m| &m.id == marketer_id).cloned())
    }
}

#[async_trait]
impl ConversionSource for MockDataSource {
    async fn find_recent_conversions(
        &self,
        customer_id: &CustomerId,
        product_id: &ProductId,
        since: TimeMs,
    ) -> Result<Vec<ConversionEvent>, DataSourceError> {
        self.check()?;
        Ok(self
            .conversions
            .iter()
            .filter(|c| {
                &c.customer_id == customer_id
                    && &c.product_id == product_id
                    && c.conversion_timestamp >= since
            })
            .cloned()
            .collect())
    }
}
