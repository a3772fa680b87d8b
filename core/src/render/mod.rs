//! Desired-state renderer: template text → ordered generic objects.
//!
//! Rendering is substitute, then split, then parse. A document that does not
//! parse, or parses to something that is not a cluster object, is logged and
//! skipped; it never fails the render.

pub mod split;
pub mod vars;

use tracing::{debug, warn};

use crate::types::object::DynamicObject;

pub use split::split_documents;
pub use vars::{VariableResolver, Variables};

/// Replace `${NAME}` and `$NAME` for every variable in `vars`.
///
/// Tokens naming an unknown variable are left verbatim. A bare `$NAME` only
/// matches when the identifier ends there, so `$NAME_SUFFIX` is untouched
/// unless `NAME_SUFFIX` is itself a variable.
pub fn substitute(template: &str, vars: &Variables) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                if let Some(value) = vars.get(&braced[..end]) {
                    out.push_str(value);
                    rest = &braced[end + 1..];
                    continue;
                }
            }
        } else {
            let len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            if len > 0 {
                if let Some(value) = vars.get(&after[..len]) {
                    out.push_str(value);
                    rest = &after[len..];
                    continue;
                }
            }
        }

        out.push('$');
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Render `template` into objects, in document order.
pub fn render(template: &str, vars: &Variables) -> Vec<DynamicObject> {
    let text = substitute(template, vars);
    let mut objects = Vec::new();

    for (index, doc) in split_documents(&text).iter().enumerate() {
        let value: serde_json::Value = match serde_yaml::from_str(doc) {
            Ok(value) => value,
            Err(e) => {
                warn!(document = index, error = %e, "skipping document that is not valid YAML");
                continue;
            }
        };
        match DynamicObject::from_value(value) {
            Ok(obj) => objects.push(obj),
            Err(reason) => {
                debug!(document = index, %reason, "skipping document that is not a cluster object");
            }
        }
    }

    objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn domain_vars() -> Variables {
        Variables::new().with("CLUSTER_DOMAIN", "apps.test.io")
    }

    #[test]
    fn substitutes_braced_and_bare_forms() {
        let out = substitute("a: ${CLUSTER_DOMAIN}\nb: x.$CLUSTER_DOMAIN\n", &domain_vars());
        assert_eq!(out, "a: apps.test.io\nb: x.apps.test.io\n");
    }

    #[test]
    fn unknown_tokens_are_left_verbatim() {
        let out = substitute("${HOME} $PATH $ ${ $CLUSTER_DOMAINX ${CLUSTER_DOMAIN", &domain_vars());
        assert_eq!(out, "${HOME} $PATH $ ${ $CLUSTER_DOMAINX ${CLUSTER_DOMAIN");
    }

    #[test]
    fn longest_identifier_is_matched() {
        let vars = Variables::new().with("TIER", "short").with("TIER_CACHE_TTL", "300");
        assert_eq!(substitute("$TIER_CACHE_TTL/$TIER", &vars), "300/short");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let vars = Variables::new().with("A", "$B").with("B", "x");
        assert_eq!(substitute("${A}", &vars), "$B");
    }

    #[test]
    fn renders_objects_in_order() {
        let template = "\
apiVersion: v1
kind: Namespace
metadata:
  name: one
---
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: gw
  namespace: openshift-ingress
spec:
  listeners:
    - hostname: maas.${CLUSTER_DOMAIN}
";
        let objects = render(template, &domain_vars());
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].kind(), "Namespace");
        assert_eq!(objects[1].name(), "gw");
        let hostname = objects[1].pointer(&["spec", "listeners"]).unwrap()[0]["hostname"].clone();
        assert_eq!(hostname, "maas.apps.test.io");
    }

    #[traced_test]
    #[test]
    fn malformed_documents_are_skipped() {
        let template = "\
# only a comment
---
key: [unclosed
---
- just
- a list
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: kept
";
        let objects = render(template, &Variables::new());
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name(), "kept");
        assert!(logs_contain("skipping document that is not valid YAML"));
    }

    #[test]
    fn embedded_templates_render_without_leftover_tokens() {
        use crate::manifest::{EmbeddedManifests, ManifestGroup};
        let vars = Variables::new()
            .with("CLUSTER_DOMAIN", "apps.test.io")
            .with("TIER_LOOKUP_URL", "http://lookup")
            .with("TIER_CACHE_TTL", "300")
            .with("TIER_CACHE_KEY", "auth.identity.user.username");
        for group in ManifestGroup::ALL {
            let objects = render(EmbeddedManifests::text(group), &vars);
            assert!(!objects.is_empty(), "{} rendered nothing", group);
            for obj in &objects {
                let text = serde_json::to_string(obj).unwrap();
                assert!(!text.contains("${"), "{} left a token in {}", group, obj.name());
            }
        }
    }
}
