pub mod cache;
pub mod vcloud;
pub mod wgdashboard;
pub mod zabbix;
