use std::str::FromStr;

use chess::{Board, BoardStatus, ChessMove, Game, MoveGen, Piece, Square};

use crate::models::game::{Color, EndReason};
use crate::services::errors::ChessServiceError;

/// Replayed position state. The halfmove clock rides on the replay because
/// the board itself does not carry it.
pub struct Position {
    game: Game,
    halfmove_clock: u32,
    fullmove_number: u32,
}

#[derive(Debug, Clone)]
pub struct AppliedMove {
    /// Canonical SAN, including check/mate suffix.
    pub san: String,
    pub from: String,
    pub to: String,
    /// Lowercase piece letter of the mover: p, n, b, r, q, k.
    pub piece: String,
    pub captured: Option<String>,
    pub promotion: Option<String>,
    pub new_fen: String,
    /// Side to move after the move.
    pub turn: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalState {
    pub over: bool,
    pub reason: Option<EndReason>,
    pub in_check: bool,
}

/// Pure move-legality seam over the chess crate: FEN in, validated SAN and
/// terminal classification out. No I/O.
#[derive(Clone, Default)]
pub struct ChessService;

impl ChessService {
    pub fn new() -> ChessService {
        ChessService
    }

    pub fn load_fen(&self, fen: &str) -> Result<Position, ChessServiceError> {
        let board = Board::from_str(fen)
            .map_err(|e| ChessServiceError::MalformedFen(format!("{}: {}", fen, e)))?;
        let mut parts = fen.split_whitespace().skip(4);
        let halfmove_clock = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let fullmove_number = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
        Ok(Position {
            game: Game::new_with_board(board),
            halfmove_clock,
            fullmove_number,
        })
    }

    /// Reconstruct a position by replaying a SAN move list from an initial
    /// FEN. The replay of an accepted game always succeeds; a failure means
    /// the stored history is corrupt.
    pub fn replay(&self, initial_fen: &str, sans: &[String]) -> Result<Position, ChessServiceError> {
        let mut position = self.load_fen(initial_fen)?;
        for san in sans {
            self.apply_move(&mut position, san, None, None)?;
        }
        Ok(position)
    }

    pub fn turn(&self, position: &Position) -> Color {
        match position.game.current_position().side_to_move() {
            chess::Color::White => Color::White,
            chess::Color::Black => Color::Black,
        }
    }

    pub fn current_fen(&self, position: &Position) -> String {
        fen_with_counters(
            &position.game.current_position(),
            position.halfmove_clock,
            position.fullmove_number,
        )
    }

    /// Validate and apply one move. Accepts SAN; falls back to coordinate
    /// squares when the client supplied them.
    pub fn apply_move(
        &self,
        position: &mut Position,
        san: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<AppliedMove, ChessServiceError> {
        let board = position.game.current_position();
        if board.status() != BoardStatus::Ongoing {
            return Err(ChessServiceError::IllegalMove(
                "position is already terminal".to_string(),
            ));
        }

        let mv = self.parse_move(&board, san, from, to)?;
        let legal: Vec<ChessMove> = MoveGen::new_legal(&board).collect();
        if !legal.contains(&mv) {
            return Err(ChessServiceError::IllegalMove(san.to_string()));
        }

        let mover = board
            .piece_on(mv.get_source())
            .ok_or_else(|| ChessServiceError::IllegalMove(san.to_string()))?;
        let is_capture =
            board.piece_on(mv.get_dest()).is_some() || is_en_passant(&board, mover, &mv);
        let captured = if let Some(piece) = board.piece_on(mv.get_dest()) {
            Some(piece_letter(piece).to_string())
        } else if is_capture {
            Some("p".to_string())
        } else {
            None
        };
        let canonical_san = format_san(&board, &mv, &legal);
        let moved_by_black = board.side_to_move() == chess::Color::Black;

        if !position.game.make_move(mv) {
            return Err(ChessServiceError::IllegalMove(san.to_string()));
        }

        if mover == Piece::Pawn || is_capture {
            position.halfmove_clock = 0;
        } else {
            position.halfmove_clock += 1;
        }
        if moved_by_black {
            position.fullmove_number += 1;
        }

        Ok(AppliedMove {
            san: canonical_san,
            from: mv.get_source().to_string(),
            to: mv.get_dest().to_string(),
            piece: piece_letter(mover).to_string(),
            captured,
            promotion: mv.get_promotion().map(|p| piece_letter(p).to_string()),
            new_fen: self.current_fen(position),
            turn: self.turn(position),
        })
    }

    pub fn legal_moves(&self, position: &Position) -> Vec<String> {
        let board = position.game.current_position();
        let legal: Vec<ChessMove> = MoveGen::new_legal(&board).collect();
        legal.iter().map(|mv| format_san(&board, mv, &legal)).collect()
    }

    /// Terminal classification over the replayed position. End-of-game is a
    /// classification, not an error.
    pub fn terminal(&self, position: &Position) -> TerminalState {
        let board = position.game.current_position();
        let in_check = board.checkers().popcnt() > 0;
        match board.status() {
            BoardStatus::Checkmate => TerminalState {
                over: true,
                reason: Some(EndReason::Checkmate),
                in_check: true,
            },
            BoardStatus::Stalemate => TerminalState {
                over: true,
                reason: Some(EndReason::Stalemate),
                in_check: false,
            },
            BoardStatus::Ongoing => {
                if insufficient_material(&board) {
                    TerminalState {
                        over: true,
                        reason: Some(EndReason::InsufficientMaterial),
                        in_check,
                    }
                } else if position.halfmove_clock >= 100 {
                    TerminalState {
                        over: true,
                        reason: Some(EndReason::FiftyMove),
                        in_check,
                    }
                } else if position.game.can_declare_draw() {
                    TerminalState {
                        over: true,
                        reason: Some(EndReason::Threefold),
                        in_check,
                    }
                } else {
                    TerminalState {
                        over: false,
                        reason: None,
                        in_check,
                    }
                }
            }
        }
    }

    fn parse_move(
        &self,
        board: &Board,
        san: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<ChessMove, ChessServiceError> {
        let cleaned = san.trim().trim_end_matches(['+', '#']);
        let legal: Vec<ChessMove> = MoveGen::new_legal(board).collect();

        if cleaned == "O-O" || cleaned == "0-0" || cleaned == "O-O-O" || cleaned == "0-0-0" {
            let long = cleaned.len() > 3;
            return legal
                .iter()
                .find(|mv| {
                    board.piece_on(mv.get_source()) == Some(Piece::King)
                        && mv
                            .get_source()
                            .get_file()
                            .to_index()
                            .abs_diff(mv.get_dest().get_file().to_index())
                            == 2
                        && (mv.get_dest().get_file().to_index()
                            < mv.get_source().get_file().to_index())
                            == long
                })
                .copied()
                .ok_or_else(|| ChessServiceError::IllegalMove(san.to_string()));
        }
        if let Ok(mv) = ChessMove::from_san(board, cleaned) {
            return Ok(mv);
        }
        // Anything the formatter can emit parses back, independent of the
        // engine crate's own SAN reader.
        if let Some(mv) = legal.iter().find(|mv| {
            format_san(board, mv, &legal).trim_end_matches(['+', '#']) == cleaned
        }) {
            return Ok(*mv);
        }
        // Coordinate form, either inline ("e2e4", "e7e8q") or via the
        // optional from/to fields.
        if let Ok(mv) = ChessMove::from_str(cleaned) {
            return Ok(mv);
        }
        if let (Some(from), Some(to)) = (from, to) {
            let source = Square::from_str(from)
                .map_err(|_| ChessServiceError::IllegalMove(format!("bad square: {}", from)))?;
            let dest = Square::from_str(to)
                .map_err(|_| ChessServiceError::IllegalMove(format!("bad square: {}", to)))?;
            let promotion = cleaned
                .rsplit('=')
                .next()
                .filter(|_| cleaned.contains('='))
                .and_then(|p| match p {
                    "Q" | "q" => Some(Piece::Queen),
                    "R" | "r" => Some(Piece::Rook),
                    "B" | "b" => Some(Piece::Bishop),
                    "N" | "n" => Some(Piece::Knight),
                    _ => None,
                });
            return Ok(ChessMove::new(source, dest, promotion));
        }
        Err(ChessServiceError::IllegalMove(san.to_string()))
    }
}

fn piece_letter(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "p",
        Piece::Knight => "n",
        Piece::Bishop => "b",
        Piece::Rook => "r",
        Piece::Queen => "q",
        Piece::King => "k",
    }
}

fn san_piece_letter(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "",
        Piece::Knight => "N",
        Piece::Bishop => "B",
        Piece::Rook => "R",
        Piece::Queen => "Q",
        Piece::King => "K",
    }
}

fn file_char(square: Square) -> char {
    (b'a' + square.get_file().to_index() as u8) as char
}

fn rank_char(square: Square) -> char {
    (b'1' + square.get_rank().to_index() as u8) as char
}

fn is_en_passant(board: &Board, mover: Piece, mv: &ChessMove) -> bool {
    mover == Piece::Pawn
        && mv.get_source().get_file() != mv.get_dest().get_file()
        && board.piece_on(mv.get_dest()).is_none()
}

/// Canonical SAN for a legal move, with disambiguation and check/mate suffix.
fn format_san(board: &Board, mv: &ChessMove, legal: &[ChessMove]) -> String {
    let piece = board
        .piece_on(mv.get_source())
        .expect("legal move has a mover");
    let dest = mv.get_dest();
    let is_capture = board.piece_on(dest).is_some() || is_en_passant(board, piece, mv);

    let mut san = if piece == Piece::King
        && mv.get_source().get_file().to_index().abs_diff(dest.get_file().to_index()) == 2
    {
        if dest.get_file().to_index() > mv.get_source().get_file().to_index() {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        }
    } else if piece == Piece::Pawn {
        let mut san = String::new();
        if is_capture {
            san.push(file_char(mv.get_source()));
            san.push('x');
        }
        san.push_str(&dest.to_string());
        if let Some(promotion) = mv.get_promotion() {
            san.push('=');
            san.push_str(&san_piece_letter(promotion).to_uppercase());
        }
        san
    } else {
        let mut san = san_piece_letter(piece).to_string();
        // Other legal moves of the same piece kind to the same square force
        // a file, rank, or full-square qualifier.
        let rivals: Vec<&ChessMove> = legal
            .iter()
            .filter(|other| {
                other.get_dest() == dest
                    && other.get_source() != mv.get_source()
                    && board.piece_on(other.get_source()) == Some(piece)
            })
            .collect();
        if !rivals.is_empty() {
            let file_unique = rivals
                .iter()
                .all(|other| other.get_source().get_file() != mv.get_source().get_file());
            let rank_unique = rivals
                .iter()
                .all(|other| other.get_source().get_rank() != mv.get_source().get_rank());
            if file_unique {
                san.push(file_char(mv.get_source()));
            } else if rank_unique {
                san.push(rank_char(mv.get_source()));
            } else {
                san.push_str(&mv.get_source().to_string());
            }
        }
        if is_capture {
            san.push('x');
        }
        san.push_str(&dest.to_string());
        san
    };

    let after = board.make_move_new(*mv);
    match after.status() {
        BoardStatus::Checkmate => san.push('#'),
        _ => {
            if after.checkers().popcnt() > 0 {
                san.push('+');
            }
        }
    }
    san
}

/// FEN with the replay's halfmove/fullmove counters spliced in; the board's
/// own rendering does not track them.
fn fen_with_counters(board: &Board, halfmove: u32, fullmove: u32) -> String {
    let rendered = board.to_string();
    let fields: Vec<&str> = rendered.split_whitespace().take(4).collect();
    format!("{} {} {}", fields.join(" "), halfmove, fullmove)
}

/// K vs K, K+minor vs K, and K+B vs K+B with same-colored bishops.
fn insufficient_material(board: &Board) -> bool {
    use chess::ALL_COLORS;

    if (board.pieces(Piece::Pawn)
        | board.pieces(Piece::Rook)
        | board.pieces(Piece::Queen))
    .popcnt()
        > 0
    {
        return false;
    }

    let knights = board.pieces(Piece::Knight);
    let bishops = board.pieces(Piece::Bishop);
    let minors = (knights | bishops).popcnt();

    match minors {
        0 | 1 => true,
        2 => {
            // Two bishops on the same square color (one per side) cannot
            // force mate; any knight pair or same-side pair can in theory.
            if knights.popcnt() > 0 {
                return false;
            }
            let mut per_side = [0u32; 2];
            for (i, color) in ALL_COLORS.iter().enumerate() {
                per_side[i] = (bishops & board.color_combined(*color)).popcnt();
            }
            if per_side[0] != 1 || per_side[1] != 1 {
                return false;
            }
            let squares: Vec<Square> = bishops.collect();
            let shade = |sq: Square| {
                (sq.get_file().to_index() + sq.get_rank().to_index()) % 2
            };
            shade(squares[0]) == shade(squares[1])
        }
        _ => false,
    }
}
