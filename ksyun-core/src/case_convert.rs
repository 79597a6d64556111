//! Case conversion between configuration field names and wire parameter names
//!
//! Configuration uses snake_case (e.g., `load_balancer_id`).
//! The Ksyun API uses CamelCase parameters (e.g., `LoadBalancerId`) and
//! kebab-case filter names (e.g., `load-balancer-id`).

/// Convert snake_case to CamelCase (PascalCase)
/// e.g., "load_balancer_id" -> "LoadBalancerId"
pub fn downline_to_hump(s: &str) -> String {
    s.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}

/// Convert CamelCase to snake_case
/// e.g., "LoadBalancerId" -> "load_balancer_id"
///
/// Every uppercase letter after the first starts a new word, so acronyms
/// split per letter: "VPCId" -> "v_p_c_id".
pub fn hump_to_downline(s: &str) -> String {
    let s = s.trim();
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Convert snake_case to a filter name
/// e.g., "load_balancer_id" -> "load-balancer-id"
pub fn downline_to_filter(s: &str) -> String {
    s.replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downline_to_hump() {
        assert_eq!(downline_to_hump("load_balancer_id"), "LoadBalancerId");
        assert_eq!(downline_to_hump("vpc_id"), "VpcId");
        assert_eq!(downline_to_hump("id"), "Id");
        assert_eq!(downline_to_hump("zone_ttl"), "ZoneTtl");
        assert_eq!(downline_to_hump("double__underscore"), "DoubleUnderscore");
        assert_eq!(downline_to_hump(""), "");
    }

    #[test]
    fn test_hump_to_downline() {
        assert_eq!(hump_to_downline("LoadBalancerId"), "load_balancer_id");
        assert_eq!(hump_to_downline("Id"), "id");
        assert_eq!(hump_to_downline("VPCId"), "v_p_c_id");
        assert_eq!(hump_to_downline(" State "), "state");
        assert_eq!(hump_to_downline("already_lower"), "already_lower");
        assert_eq!(hump_to_downline(""), "");
    }

    #[test]
    fn test_downline_to_filter() {
        assert_eq!(downline_to_filter("load_balancer_id"), "load-balancer-id");
        assert_eq!(downline_to_filter("state"), "state");
    }

    #[test]
    fn hump_roundtrip_for_regular_names() {
        for name in ["listener_port", "health_check_state", "network_interface_id"] {
            assert_eq!(hump_to_downline(&downline_to_hump(name)), name);
        }
    }
}
