use crate::event::RowIdentity;
use std::borrow::Cow;

const DATABASE_PLACEHOLDER: &str = "%{database}";
const TABLE_PLACEHOLDER: &str = "%{table}";

/// Topic name that may contain `%{database}` and `%{table}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    template: String,
    interpolate: bool,
}

impl TopicTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let interpolate = template.contains("%{");
        Self {
            template,
            interpolate,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn has_placeholders(&self) -> bool {
        self.interpolate
    }

    /// Substitutes the row's database and table. Borrows the template
    /// unchanged when it has no placeholders.
    pub fn resolve(&self, identity: &RowIdentity) -> Cow<'_, str> {
        if !self.interpolate {
            return Cow::Borrowed(&self.template);
        }
        Cow::Owned(
            self.template
                .replace(DATABASE_PLACEHOLDER, &identity.database)
                .replace(TABLE_PLACEHOLDER, identity.table_name()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolation() {
        let template = TopicTemplate::new("cdc.%{database}.%{table}");
        let identity = RowIdentity::new("shop", "orders");

        assert!(template.has_placeholders());
        assert_eq!(template.resolve(&identity), "cdc.shop.orders");
    }

    #[test]
    fn test_plain_topic_is_borrowed() {
        let template = TopicTemplate::new("maxwell");
        let identity = RowIdentity::new("shop", "orders");

        assert!(!template.has_placeholders());
        assert!(matches!(template.resolve(&identity), Cow::Borrowed("maxwell")));
    }

    #[test]
    fn test_missing_table_substitutes_empty() {
        let template = TopicTemplate::new("ddl_%{database}_%{table}");
        assert_eq!(template.resolve(&RowIdentity::database_only("shop")), "ddl_shop_");
    }

    #[test]
    fn test_values_are_substituted_literally() {
        let template = TopicTemplate::new("%{table}");
        let identity = RowIdentity::new("db", "%{database}");
        // Table name is inserted after database substitution, so it is not re-expanded.
        assert_eq!(template.resolve(&identity), "%{database}");
    }
}
