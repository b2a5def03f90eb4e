//! Performance metrics over the trade log and equity series.

use crate::domain::engine::Ledger;
use crate::domain::equity::EquityPoint;
use crate::domain::position::ExitReason;
use serde::Serialize;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub days_evaluated: usize,
    pub days_traded: usize,
    pub days_no_trade: usize,
    pub days_excluded: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub net_pnl: f64,
    pub net_points: f64,
    pub avg_win: f64,
    /// Magnitude of the average losing trade.
    pub avg_loss: f64,
    /// Mean P&L per trade.
    pub expectancy: f64,
    /// Gross wins over gross losses; undefined without a losing trade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub stop_exits: usize,
    pub target_exits: usize,
    pub hard_exits: usize,
    pub avg_mfe_points: f64,
    pub avg_mae_points: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    /// Longest run of consecutive recorded days below the peak.
    pub max_drawdown_duration: usize,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
}

impl Metrics {
    pub fn compute(ledger: &Ledger, risk_free_rate: f64) -> Self {
        let records = ledger.log().records();
        let initial_capital = ledger.equity().initial_capital();
        let points = ledger.equity().points();

        let trades: Vec<_> = records.iter().filter(|r| r.is_trade()).collect();

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut stop_exits = 0usize;
        let mut target_exits = 0usize;
        let mut hard_exits = 0usize;

        for trade in &trades {
            let pnl = trade.pnl_usd;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            match trade.exit_reason {
                Some(ExitReason::StopLoss) => stop_exits += 1,
                Some(ExitReason::TakeProfit) => target_exits += 1,
                Some(ExitReason::HardExit) => hard_exits += 1,
                None => {}
            }
        }

        let total_trades = trades.len();
        let net_pnl: f64 = trades.iter().map(|t| t.pnl_usd).sum();
        let net_points: f64 = trades.iter().map(|t| t.points_gained).sum();

        let win_rate = ratio(trades_won as f64, total_trades);
        let avg_win = ratio(total_wins, trades_won);
        let avg_loss = ratio(total_losses, trades_lost);
        let expectancy = ratio(net_pnl, total_trades);

        let profit_factor = (total_losses > 0.0).then(|| total_wins / total_losses);

        let avg_mfe_points = ratio(trades.iter().filter_map(|t| t.mfe_points).sum(), total_trades);
        let avg_mae_points = ratio(trades.iter().filter_map(|t| t.mae_points).sum(), total_trades);

        let final_equity = ledger.equity().equity();
        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct, max_drawdown_duration) = compute_drawdown(points);

        let mut equities = Vec::with_capacity(points.len() + 1);
        equities.push(initial_capital);
        equities.extend(points.iter().map(|p| p.equity_after));
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&equities, daily_rf);

        let days_excluded = ledger.log().exclusions().len();
        Metrics {
            days_evaluated: records.len() + days_excluded,
            days_traded: total_trades,
            days_no_trade: records.len() - total_trades,
            days_excluded,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            net_pnl,
            net_points,
            avg_win,
            avg_loss,
            expectancy,
            profit_factor,
            largest_win,
            largest_loss,
            stop_exits,
            target_exits,
            hard_exits,
            avg_mfe_points,
            avg_mae_points,
            max_drawdown,
            max_drawdown_pct,
            max_drawdown_duration,
            total_return,
            sharpe_ratio,
            sortino_ratio,
        }
    }
}

fn ratio(total: f64, count: usize) -> f64 {
    if count > 0 {
        total / count as f64
    } else {
        0.0
    }
}

fn compute_drawdown(points: &[EquityPoint]) -> (f64, f64, usize) {
    let mut max_dd = 0.0_f64;
    let mut max_dd_pct = 0.0_f64;
    let mut max_duration = 0usize;
    let mut current_duration = 0usize;

    for point in points {
        if point.drawdown_from_peak > 0.0 {
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        } else {
            current_duration = 0;
        }
        max_dd = max_dd.max(point.drawdown_from_peak);
        max_dd_pct = max_dd_pct.max(point.drawdown_pct);
    }

    (max_dd, max_dd_pct, max_duration)
}

fn compute_risk_adjusted(equities: &[f64], daily_rf: f64) -> (f64, f64) {
    if equities.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equities
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
