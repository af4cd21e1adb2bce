//! refspec parsing and expansion: `[+]src:dst` with a single `*` wildcard

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refspec {
    pub force: bool,
    pub src: String,
    pub dst: String,
    pub wildcard: bool,
}

impl Refspec {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(Error::MalformedRef("empty refspec".into()));
        }
        let (force, spec) = match spec.strip_prefix('+') {
            Some(rest) => (true, rest.trim()),
            None => (false, spec),
        };
        let (src, dst) = spec
            .split_once(':')
            .ok_or_else(|| Error::MalformedRef(format!("refspec needs src:dst: {spec:?}")))?;
        let (src, dst) = (src.trim().to_string(), dst.trim().to_string());
        if src.is_empty() || dst.is_empty() {
            return Err(Error::MalformedRef(format!(
                "refspec src and dst must be non-empty: {spec:?}"
            )));
        }
        let wildcard = src.contains('*') || dst.contains('*');
        if wildcard
            && (src.matches('*').count() != 1 || dst.matches('*').count() != 1)
        {
            return Err(Error::MalformedRef(format!(
                "refspec wildcard must appear exactly once on each side: {spec:?}"
            )));
        }
        Ok(Self {
            force,
            src,
            dst,
            wildcard,
        })
    }

    /// map a concrete source ref through this spec; None when it misses
    pub fn expand(&self, src_ref: &str) -> Option<String> {
        if !self.wildcard {
            return (self.src == src_ref).then(|| self.dst.clone());
        }
        let star = self.src.find('*').expect("wildcard spec");
        let (prefix, suffix) = (&self.src[..star], &self.src[star + 1..]);
        if !src_ref.starts_with(prefix) || !src_ref.ends_with(suffix) {
            return None;
        }
        if src_ref.len() < prefix.len() + suffix.len() {
            return None;
        }
        let middle = &src_ref[prefix.len()..src_ref.len() - suffix.len()];
        let dst_star = self.dst.find('*').expect("wildcard spec");
        Some(format!(
            "{}{}{}",
            &self.dst[..dst_star],
            middle,
            &self.dst[dst_star + 1..]
        ))
    }

    /// (src, dst) pairs for every matching source ref
    pub fn expand_all(&self, src_refs: &[String]) -> Vec<(String, String)> {
        src_refs
            .iter()
            .filter_map(|src| self.expand(src).map(|dst| (src.clone(), dst)))
            .collect()
    }
}
