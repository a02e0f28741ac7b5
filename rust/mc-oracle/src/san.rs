//! Standard algebraic notation on top of cozy-chess moves.
//!
//! cozy-chess encodes castling as the king capturing its own rook; that is
//! rendered `O-O` / `O-O-O` here.

use cozy_chess::{Board, Color, Move, Piece, Square};

fn piece_letter(p: Piece) -> Option<char> {
    match p {
        Piece::Pawn => None,
        Piece::Knight => Some('N'),
        Piece::Bishop => Some('B'),
        Piece::Rook => Some('R'),
        Piece::Queen => Some('Q'),
        Piece::King => Some('K'),
    }
}

fn file_char(sq: Square) -> char {
    (b'a' + sq.file() as u8) as char
}

fn rank_char(sq: Square) -> char {
    (b'1' + sq.rank() as u8) as char
}

pub(crate) fn is_castle(board: &Board, mv: Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board.color_on(mv.to) == Some(board.side_to_move())
}

pub(crate) fn is_capture(board: &Board, mv: Move) -> bool {
    let stm = board.side_to_move();
    if board.color_on(mv.to) == Some(!stm) {
        return true;
    }
    // En passant: a pawn changing file onto an empty square.
    board.piece_on(mv.from) == Some(Piece::Pawn) && mv.from.file() != mv.to.file()
}

pub(crate) fn legal_moves(board: &Board) -> Vec<Move> {
    let mut v = Vec::new();
    board.generate_moves(|ml| {
        v.extend(ml);
        false
    });
    v
}

pub(crate) fn has_legal_move(board: &Board) -> bool {
    let mut any = false;
    board.generate_moves(|_| {
        any = true;
        true
    });
    any
}

/// SAN without the check/mate suffix. `legal` is the full legal move list of
/// `board`, used for disambiguation.
pub(crate) fn san_core(board: &Board, mv: Move, legal: &[Move]) -> String {
    if is_castle(board, mv) {
        return if mv.to.file() as u8 > mv.from.file() as u8 {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        };
    }
    let Some(piece) = board.piece_on(mv.from) else {
        return String::new();
    };
    let capture = is_capture(board, mv);
    let mut s = String::with_capacity(7);

    match piece_letter(piece) {
        None => {
            if capture {
                s.push(file_char(mv.from));
            }
        }
        Some(letter) => {
            s.push(letter);
            if piece != Piece::King {
                let rivals: Vec<Square> = legal
                    .iter()
                    .filter(|m| {
                        m.to == mv.to && m.from != mv.from && board.piece_on(m.from) == Some(piece)
                    })
                    .map(|m| m.from)
                    .collect();
                if !rivals.is_empty() {
                    let same_file = rivals.iter().any(|r| r.file() == mv.from.file());
                    let same_rank = rivals.iter().any(|r| r.rank() == mv.from.rank());
                    if !same_file {
                        s.push(file_char(mv.from));
                    } else if !same_rank {
                        s.push(rank_char(mv.from));
                    } else {
                        s.push(file_char(mv.from));
                        s.push(rank_char(mv.from));
                    }
                }
            }
        }
    }

    if capture {
        s.push('x');
    }
    s.push(file_char(mv.to));
    s.push(rank_char(mv.to));
    if let Some(promo) = mv.promotion.and_then(piece_letter) {
        s.push('=');
        s.push(promo);
    }
    s
}

/// Full SAN including `+` or `#`.
pub(crate) fn san(board: &Board, mv: Move, legal: &[Move]) -> String {
    let mut s = san_core(board, mv, legal);
    let mut next = board.clone();
    next.play_unchecked(mv);
    if !next.checkers().is_empty() {
        s.push(if has_legal_move(&next) { '+' } else { '#' });
    }
    s
}

/// Canonical form used to match user input against generated SAN: check and
/// annotation suffixes dropped, zero-castling normalized.
pub fn normalize_san(input: &str) -> String {
    let core = input.trim().trim_end_matches(&['+', '#', '!', '?'][..]);
    match core {
        "0-0" => "O-O".to_string(),
        "0-0-0" => "O-O-O".to_string(),
        other => other.to_string(),
    }
}

/// Side to move as a lowercase word.
pub fn color_name(c: Color) -> &'static str {
    match c {
        Color::White => "white",
        Color::Black => "black",
    }
}
