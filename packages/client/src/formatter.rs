//! Message formatting for client display.

use tobira_shared::time::timestamp_to_rfc3339;

pub struct MessageFormatter;

impl MessageFormatter {
    /// Format a message received from the relay
    ///
    /// # Arguments
    ///
    /// * `content` - Text received from the relay
    /// * `received_at` - Unix timestamp when it arrived (milliseconds)
    pub fn format_received(content: &str, received_at: i64) -> String {
        format!(
            "\n< {}\n  received at {}\n",
            content,
            timestamp_to_rfc3339(received_at)
        )
    }

    /// Format the confirmation shown after a line was sent
    pub fn format_sent_confirmation(sent_at: i64) -> String {
        format!("  sent at {}\n", timestamp_to_rfc3339(sent_at))
    }

    /// Format a binary WebSocket frame, which the client does not decode
    pub fn format_binary_message(len: usize) -> String {
        format!("\n< [binary data: {} bytes]\n", len)
    }
}
