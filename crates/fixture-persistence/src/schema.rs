//! Esquema Diesel, mantenido a mano en paralelo con `migrations/`.
//! Reemplazable con `diesel print-schema` contra una base migrada.

diesel::table! {
    scheduling_runs (run_id) {
        run_id -> Uuid,
        season_id -> Integer,
        season_day_id -> Integer,
        process_type -> Text,
        run_type -> Nullable<Text>,
        run_status -> Text,
        s1_check_results -> Text,
        round_ids -> Array<Integer>,
        seed_master -> Text,
        resume_checkpoint -> Text,
        config_hash -> Text,
        idempotency_key -> Text,
        metrics -> Nullable<Jsonb>,
        error_code -> Nullable<Text>,
        error_details -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        finished_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    scheduling_day_locks (season_day_id) {
        season_day_id -> Integer,
        run_id -> Uuid,
        locked_at -> Timestamptz,
    }
}

diesel::table! {
    p2_slot_allocations (claim_seq) {
        claim_seq -> BigInt,
        p2_allocation_id -> Uuid,
        run_id -> Uuid,
        round_id -> Integer,
        age_id -> Integer,
        grade_id -> Integer,
        court_time_id -> Integer,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    p3_game_allocations (insert_seq) {
        insert_seq -> BigInt,
        p3_allocation_id -> Uuid,
        run_id -> Uuid,
        p2_allocation_id -> Nullable<Uuid>,
        round_id -> Integer,
        age_id -> Integer,
        grade_id -> Integer,
        team_a_id -> Integer,
        team_b_id -> Integer,
        court_time_id -> Integer,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    p3_bye_allocations (insert_seq) {
        insert_seq -> BigInt,
        p3_bye_id -> Uuid,
        run_id -> Uuid,
        round_id -> Integer,
        age_id -> Integer,
        grade_id -> Integer,
        team_id -> Integer,
        bye_reason -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    staging_diffs (diff_seq) {
        diff_seq -> BigInt,
        run_id -> Uuid,
        entity_type -> Text,
        entity_id -> Text,
        change_type -> Text,
        before_state -> Nullable<Jsonb>,
        after_state -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    snapshot_games (saved_game_id) {
        saved_game_id -> Uuid,
        run_id -> Uuid,
        round_id -> Integer,
        age_id -> Integer,
        grade_id -> Integer,
        team_a_id -> Nullable<Integer>,
        team_b_id -> Nullable<Integer>,
        court_time_id -> Integer,
        game_status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    snapshot_byes (saved_bye_id) {
        saved_bye_id -> Uuid,
        run_id -> Uuid,
        round_id -> Integer,
        age_id -> Integer,
        grade_id -> Integer,
        team_id -> Integer,
        bye_reason -> Text,
        game_status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    constraint_snapshots (run_id, phase) {
        run_id -> Uuid,
        phase -> Text,
        snapshot -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    final_games (final_game_id) {
        final_game_id -> Uuid,
        run_id -> Uuid,
        round_id -> Integer,
        court_time_id -> Integer,
        age_id -> Integer,
        grade_id -> Integer,
        team_a_id -> Integer,
        team_b_id -> Integer,
        game_date -> Date,
        start_time -> Time,
        game_name -> Text,
        organisation_name -> Text,
        competition_name -> Text,
        season_name -> Text,
        venue_name -> Text,
        court_name -> Text,
        age_name -> Text,
        grade_name -> Text,
        team_a_name -> Text,
        team_b_name -> Text,
        game_status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    final_byes (final_bye_id) {
        final_bye_id -> Uuid,
        run_id -> Uuid,
        round_id -> Integer,
        age_id -> Integer,
        grade_id -> Integer,
        team_id -> Integer,
        bye_date -> Date,
        bye_name -> Text,
        organisation_name -> Text,
        competition_name -> Text,
        season_name -> Text,
        age_name -> Text,
        grade_name -> Text,
        team_name -> Text,
        bye_reason -> Text,
        game_status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    run_events (seq) {
        seq -> BigInt,
        run_id -> Uuid,
        stage -> Text,
        severity -> Text,
        event_message -> Text,
        context -> Nullable<Jsonb>,
        ts -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(scheduling_runs,
                                              scheduling_day_locks,
                                              p2_slot_allocations,
                                              p3_game_allocations,
                                              p3_bye_allocations,
                                              staging_diffs,
                                              snapshot_games,
                                              snapshot_byes,
                                              constraint_snapshots,
                                              final_games,
                                              final_byes,
                                              run_events);
