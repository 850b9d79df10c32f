pub mod customer;
pub mod deployment_audit;
pub mod route_binding;
pub mod ssh_info;
pub mod virtual_machine;
