use std::collections::HashSet;

use ktreg_oracle::{
    extract_trace, solve, verify_trace, verify_transcript, Board, Cell, Mismatch, Observed,
    TourError, TourTrace, Verdict, VerifyError, KNIGHT_OFFSETS,
};

fn cells(raw: &[(usize, usize)]) -> Vec<Cell> {
    raw.iter().copied().map(Cell::from).collect()
}

fn is_knight_move(a: Cell, b: Cell) -> bool {
    let dx = b.x as isize - a.x as isize;
    let dy = b.y as isize - a.y as isize;
    KNIGHT_OFFSETS.contains(&(dx, dy))
}

fn transcript(start: Cell, coords: &[Cell]) -> String {
    let mut out = format!("# KnightsTour starting at coordinate: {start}\n");
    for c in coords {
        out.push_str(&format!("# Coordinate on the board: {c}\n"));
    }
    out
}

const GOLDEN_FROM_ORIGIN: [(usize, usize); 25] = [
    (0, 0),
    (1, 2),
    (2, 4),
    (0, 3),
    (1, 1),
    (3, 0),
    (4, 2),
    (3, 4),
    (1, 3),
    (0, 1),
    (2, 0),
    (4, 1),
    (3, 3),
    (1, 4),
    (2, 2),
    (4, 3),
    (3, 1),
    (1, 0),
    (0, 2),
    (2, 1),
    (4, 0),
    (3, 2),
    (4, 4),
    (2, 3),
    (0, 4),
];

#[test]
fn golden_tour_from_origin() {
    let tour = solve(Board::STANDARD, Cell::new(0, 0)).expect("tour from (0,0)");
    assert_eq!(tour.path, cells(&GOLDEN_FROM_ORIGIN));
}

#[test]
fn golden_tour_from_centre() {
    let tour = solve(Board::STANDARD, Cell::new(2, 2)).expect("tour from (2,2)");
    assert_eq!(
        tour.path,
        cells(&[
            (2, 2),
            (3, 4),
            (1, 3),
            (0, 1),
            (2, 0),
            (4, 1),
            (3, 3),
            (1, 4),
            (0, 2),
            (1, 0),
            (3, 1),
            (4, 3),
            (2, 4),
            (0, 3),
            (1, 1),
            (3, 0),
            (4, 2),
            (2, 3),
            (0, 4),
            (1, 2),
            (0, 0),
            (2, 1),
            (4, 0),
            (3, 2),
            (4, 4),
        ])
    );
}

#[test]
fn golden_tour_on_four_by_five() {
    let board = Board::new(4, 5).expect("board");
    let tour = solve(board, Cell::new(0, 0)).expect("tour");
    assert_eq!(
        tour.path,
        cells(&[
            (0, 0),
            (1, 2),
            (0, 4),
            (2, 3),
            (3, 1),
            (1, 0),
            (0, 2),
            (1, 4),
            (3, 3),
            (2, 1),
            (1, 3),
            (0, 1),
            (2, 0),
            (3, 2),
            (2, 4),
            (0, 3),
            (1, 1),
            (3, 0),
            (2, 2),
            (3, 4),
        ])
    );
}

#[test]
fn every_start_is_a_full_tour_or_infeasible() {
    let board = Board::STANDARD;
    let mut feasible = 0;
    for x in 0..5 {
        for y in 0..5 {
            let start = Cell::new(x, y);
            match solve(board, start) {
                Ok(tour) => {
                    feasible += 1;
                    assert_eq!(tour.path.len(), 25, "start {start}");
                    assert_eq!(tour.start(), start);
                    let distinct: HashSet<_> = tour.path.iter().copied().collect();
                    assert_eq!(distinct.len(), 25, "start {start} revisits a square");
                    assert!(tour.path.iter().all(|c| board.contains(*c)));
                    for pair in tour.path.windows(2) {
                        assert!(is_knight_move(pair[0], pair[1]), "{} -> {}", pair[0], pair[1]);
                    }
                    assert_eq!((x + y) % 2, 0, "odd-coloured start {start} toured");
                }
                Err(TourError::Infeasible { start: s, .. }) => {
                    assert_eq!(s, start);
                    assert_eq!((x + y) % 2, 1, "even-coloured start {start} infeasible");
                }
                Err(other) => panic!("unexpected error from {start}: {other}"),
            }
        }
    }
    assert_eq!(feasible, 13);
}

#[test]
fn solver_is_deterministic() {
    for (x, y) in [(0, 0), (2, 2), (4, 4), (1, 3)] {
        let start = Cell::new(x, y);
        assert_eq!(
            solve(Board::STANDARD, start),
            solve(Board::STANDARD, start)
        );
    }
}

#[test]
fn faithful_trace_verifies() {
    let start = Cell::new(0, 0);
    let tour = solve(Board::STANDARD, start).expect("tour");
    let verdict = verify_transcript(Board::STANDARD, &transcript(start, tour.moves()));
    assert_eq!(verdict, Ok(Verdict::Match { moves: 24 }));
}

#[test]
fn unreachable_second_move_is_a_mismatch() {
    let text = "KnightsTour starting at coordinate: (0, 0)\n\
                Coordinate on the board: (1, 2)\n\
                Coordinate on the board: (3, 3)\n";
    let verdict = verify_transcript(Board::STANDARD, text).expect("verification runs");
    assert_eq!(
        verdict,
        Verdict::Mismatch(Mismatch {
            index: 1,
            expected: Some(Cell::new(2, 4)),
            observed: Some(Observed::Square(Cell::new(3, 3))),
        })
    );
}

#[test]
fn single_edits_flip_to_mismatch() {
    let start = Cell::new(2, 2);
    let tour = solve(Board::STANDARD, start).expect("tour");
    let moves = tour.moves().to_vec();
    let check = |coordinates: Vec<Cell>| {
        verify_trace(
            Board::STANDARD,
            &TourTrace::from_cells(start, &coordinates),
        )
        .expect("verification runs")
    };

    for i in 0..moves.len() - 1 {
        let mut swapped = moves.clone();
        swapped.swap(i, i + 1);
        assert!(!check(swapped).is_match(), "transposition at {i}");
    }
    for i in 0..moves.len() {
        let mut deleted = moves.clone();
        deleted.remove(i);
        assert!(!check(deleted).is_match(), "deletion at {i}");
    }
    for i in 0..=moves.len() {
        let mut inserted = moves.clone();
        inserted.insert(i, Cell::new(0, 0));
        assert!(!check(inserted).is_match(), "insertion at {i}");
    }
    assert!(check(moves).is_match());
}

#[test]
fn trace_round_trips_through_transcript_text() {
    let start = Cell::new(4, 4);
    let tour = solve(Board::STANDARD, start).expect("tour");
    let trace = extract_trace(&transcript(start, tour.moves()));
    assert_eq!(trace, TourTrace::from_cells(start, tour.moves()));
}

/// Splices raw coordinate lines into a faithful transcript at `at`.
fn transcript_with_raw_lines(start: Cell, at: usize, raw: &[&str]) -> String {
    let tour = solve(Board::STANDARD, start).expect("tour");
    let mut lines: Vec<String> = transcript(start, tour.moves())
        .lines()
        .map(str::to_string)
        .collect();
    // Line 0 is the start line.
    for (k, r) in raw.iter().enumerate() {
        lines.insert(1 + at + k, format!("# Coordinate on the board: {r}"));
    }
    lines.join("\n")
}

#[test]
fn inserted_negative_coordinate_is_a_mismatch() {
    let text = transcript_with_raw_lines(Cell::new(0, 0), 3, &["(-1, 2)"]);
    let verdict = verify_transcript(Board::STANDARD, &text).expect("verification runs");
    let Verdict::Mismatch(m) = verdict else {
        panic!("negative coordinate was dropped: {verdict:?}");
    };
    assert_eq!(m.index, 3);
    assert_eq!(
        m.observed,
        Some(Observed::OffBoard {
            x: "-1".to_string(),
            y: "2".to_string()
        })
    );
}

#[test]
fn oversized_and_garbled_coordinates_are_mismatches() {
    for raw in ["(4294967296, 2)", "(18446744073709551616, 0)", "(2, x)"] {
        let text = transcript_with_raw_lines(Cell::new(0, 0), 24, &[raw]);
        let verdict = verify_transcript(Board::STANDARD, &text).expect("verification runs");
        let Verdict::Mismatch(m) = verdict else {
            panic!("{raw} was dropped: {verdict:?}");
        };
        assert_eq!(m.index, 24, "{raw}");
        assert_eq!(m.expected, None);
        assert!(m.observed.is_some());
    }

    // 4294967296 fits a 64-bit usize, so it is a square, just not on this board.
    let text = transcript_with_raw_lines(Cell::new(0, 0), 0, &["(4294967296, 2)"]);
    let Ok(Verdict::Mismatch(m)) = verify_transcript(Board::STANDARD, &text) else {
        panic!("expected a mismatch");
    };
    assert_eq!(m.index, 0);
    assert_eq!(m.expected, Some(Cell::new(1, 2)));
    assert_eq!(m.observed.map(|o| o.to_string()).as_deref(), Some("(4294967296, 2)"));
}

#[test]
fn unusable_start_cannot_be_verified() {
    let text = "KnightsTour starting at coordinate: (-1, 0)
                Coordinate on the board: (1, 2)
";
    assert!(matches!(
        verify_transcript(Board::STANDARD, text),
        Err(VerifyError::UnusableStart { .. })
    ));
}
