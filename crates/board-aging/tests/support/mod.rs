pub mod scripted_board;
