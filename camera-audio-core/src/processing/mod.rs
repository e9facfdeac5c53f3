pub mod send_queue;
