pub mod domain_event_repository;
pub mod notification_repository;
pub mod preference_repository;
pub mod status_repository;
pub mod template_repository;
pub mod work_queue_repository;

pub use domain_event_repository::DomainEventRepository;
pub use notification_repository::NotificationRepository;
pub use preference_repository::PreferenceRepository;
pub use status_repository::StatusRepository;
pub use template_repository::TemplateRepository;
pub use work_queue_repository::WorkQueueRepository;
