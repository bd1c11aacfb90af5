use crate::error::{ConfigError, ConfigResult};
use crate::ir::{Param, UnionParam, Variant};

/// Appends variants to a union. The tag invariant is checked as each
/// variant is appended, not when the union is first used.
#[derive(Debug)]
pub struct UnionBuilder {
    name: String,
    discriminator: Option<String>,
    variants: Vec<Variant>,
}

impl UnionBuilder {
    pub fn new(name: impl Into<String>, discriminator: Option<&str>) -> Self {
        Self {
            name: name.into(),
            discriminator: discriminator.map(str::to_owned),
            variants: Vec::new(),
        }
    }

    pub fn discriminator(&self) -> Option<&str> { self.discriminator.as_deref() }

    /// A repeated tag replaces the earlier variant, matching how re-opened
    /// type declarations override.
    pub fn variant(&mut self, tag: Option<&str>, param: Param) -> ConfigResult<&mut Self> {
        match (&self.discriminator, tag) {
            (Some(discriminator), None) => {
                return Err(ConfigError::DiscriminatorTagMissing {
                    union: self.name.clone(),
                    discriminator: discriminator.clone(),
                });
            }
            (None, Some(tag)) => {
                return Err(ConfigError::TagWithoutDiscriminator {
                    union: self.name.clone(),
                    tag: tag.to_owned(),
                });
            }
            _ => {}
        }
        let variant = Variant { tag: tag.map(str::to_owned), param };
        match tag {
            Some(tag) => {
                match self.variants.iter_mut().find(|v| v.tag.as_deref() == Some(tag)) {
                    Some(existing) => *existing = variant,
                    None => self.variants.push(variant),
                }
            }
            None => {
                if !self.variants.contains(&variant) {
                    self.variants.push(variant);
                }
            }
        }
        Ok(self)
    }

    pub fn tagged(&mut self, tag: &str, param: Param) -> ConfigResult<&mut Self> {
        self.variant(Some(tag), param)
    }

    pub fn untagged(&mut self, param: Param) -> ConfigResult<&mut Self> {
        self.variant(None, param)
    }

    pub fn build(self) -> ConfigResult<UnionParam> {
        if self.variants.is_empty() {
            return Err(ConfigError::UnionEmpty { union: self.name });
        }
        Ok(UnionParam::from_parts(self.discriminator, self.variants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminated_union_requires_tags() {
        let mut u = UnionBuilder::new("vehicle", Some("kind"));
        let err = u.untagged(Param::reference("car")).unwrap_err();
        assert!(matches!(err, ConfigError::DiscriminatorTagMissing { .. }));
    }

    #[test]
    fn plain_union_forbids_tags() {
        let mut u = UnionBuilder::new("value", None);
        let err = u.tagged("x", Param::string()).unwrap_err();
        assert!(matches!(err, ConfigError::TagWithoutDiscriminator { .. }));
    }

    #[test]
    fn empty_union_is_rejected() {
        let err = UnionBuilder::new("nothing", None).build().unwrap_err();
        assert_eq!(err, ConfigError::UnionEmpty { union: "nothing".into() });
    }

    #[test]
    fn repeated_tag_replaces() {
        let mut u = UnionBuilder::new("vehicle", Some("kind"));
        u.tagged("car", Param::reference("car")).unwrap();
        u.tagged("truck", Param::reference("truck")).unwrap();
        u.tagged("car", Param::reference("sedan")).unwrap();
        let built = u.build().unwrap();
        assert_eq!(built.tags(), ["car", "truck"]);
        assert_eq!(built.variant("car").unwrap().param.reference_name(), Some("sedan"));
    }
}
