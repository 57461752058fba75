//! Diesel schema for job persistence.

diesel::table! {
    /// Queued jobs, including retained failures.
    jobs (id) {
        /// Job identifier.
        id -> Uuid,
        /// Payload discriminant, for inspection.
        #[max_length = 50]
        kind -> Varchar,
        /// Serialized payload.
        payload -> Jsonb,
        /// Delivery state.
        #[max_length = 20]
        state -> Varchar,
        /// Failed attempts so far.
        attempts_made -> Int4,
        /// Attempt ceiling.
        max_attempts -> Int4,
        /// Backoff base delay in milliseconds.
        backoff_base_ms -> Int8,
        /// Earliest delivery time.
        available_at -> Timestamptz,
        /// Deadline after which an active job may be redelivered.
        lease_expires_at -> Nullable<Timestamptz>,
        /// Latest failure reason.
        last_error -> Nullable<Text>,
        /// Enqueue timestamp.
        created_at -> Timestamptz,
        /// Last state change timestamp.
        updated_at -> Timestamptz,
    }
}
