//! Resource types managed by the Ksyun provider

pub mod lb;
pub mod lb_listener;
pub mod nat_associate;
pub mod network_interface;
pub mod pdns_zone;
pub mod tag;

use ksyun_core::provider::ResourceType;

pub use lb::LoadBalancer;
pub use lb_listener::LbListener;
pub use nat_associate::NatAssociate;
pub use network_interface::NetworkInterface;
pub use pdns_zone::PdnsZone;
pub use tag::Tag;

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(LoadBalancer),
        Box::new(LbListener),
        Box::new(NetworkInterface),
        Box::new(PdnsZone),
        Box::new(Tag),
        Box::new(NatAssociate),
    ]
}
