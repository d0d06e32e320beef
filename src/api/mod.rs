pub mod notifications;
pub mod razorpay;

pub struct ApiUrls {
    pub notification_service_url: String,
}

impl ApiUrls {
    pub fn init() -> Self {
        Self {
            notification_service_url: Self::get_notification_service_url(),
        }
    }

    pub fn get_notification_service_url() -> String {
        std::env::var("NOTIFICATION_SERVICE_URL")
            .unwrap_or("http://localhost:3000/notification-service".to_string())
    }
}
